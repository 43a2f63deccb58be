use std::time::Duration;

use tracing::{debug, warn};

/// Handle for one periodic tick schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleToken(u64);

impl ScheduleToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Owner of the periodic tick. The timer asks it to start and cancel ticking
/// instead of holding a raw handle itself.
pub trait Scheduler {
    /// Begin ticking at `interval`. Any schedule that is still active is
    /// replaced, so there is never more than one.
    fn start(&mut self, interval: Duration) -> ScheduleToken;

    /// Stop ticking. Cancelling with nothing active is a no-op.
    fn cancel(&mut self);

    fn active(&self) -> Option<ScheduleToken>;

    fn interval(&self) -> Option<Duration>;
}

/// Scheduler for the event loop: ticks are dispatched only while a token is
/// active.
#[derive(Debug, Default)]
pub struct TickScheduler {
    next_id: u64,
    active: Option<(ScheduleToken, Duration)>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for TickScheduler {
    fn start(&mut self, interval: Duration) -> ScheduleToken {
        if let Some((previous, _)) = self.active.take() {
            warn!(token = previous.id(), "replacing a tick schedule that was never cancelled");
        }
        self.next_id += 1;
        let token = ScheduleToken(self.next_id);
        self.active = Some((token, interval));
        debug!(token = token.id(), interval_ms = interval.as_millis() as u64, "tick scheduled");
        token
    }

    fn cancel(&mut self) {
        if let Some((token, _)) = self.active.take() {
            debug!(token = token.id(), "tick cancelled");
        }
    }

    fn active(&self) -> Option<ScheduleToken> {
        self.active.map(|(token, _)| token)
    }

    fn interval(&self) -> Option<Duration> {
        self.active.map(|(_, interval)| interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_cancel() {
        let mut scheduler = TickScheduler::new();
        assert_eq!(scheduler.active(), None);

        let token = scheduler.start(Duration::from_millis(100));
        assert_eq!(scheduler.active(), Some(token));
        assert_eq!(scheduler.interval(), Some(Duration::from_millis(100)));

        scheduler.cancel();
        assert_eq!(scheduler.active(), None);
        assert_eq!(scheduler.interval(), None);
    }

    #[test]
    fn restart_replaces_previous_token() {
        let mut scheduler = TickScheduler::new();
        let first = scheduler.start(Duration::from_millis(100));
        let second = scheduler.start(Duration::from_millis(50));

        assert_ne!(first, second);
        assert_eq!(scheduler.active(), Some(second));
        assert_eq!(scheduler.interval(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn cancel_without_schedule_is_noop() {
        let mut scheduler = TickScheduler::new();
        scheduler.cancel();
        assert_eq!(scheduler.active(), None);
    }
}
