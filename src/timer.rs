use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::TimerError;
use crate::format::format_duration;
use crate::laps::{is_beyond_threshold, Lap, LapLedger};
use crate::scheduler::Scheduler;
use crate::settings::TimerSettings;

pub const INITIAL_DISPLAY: &str = "00:00:00.0";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
pub enum LifecycleState {
    #[default]
    #[serde(rename = "Not Started")]
    #[strum(serialize = "Not Started")]
    NotStarted,
    Settings,
    Running,
    Paused,
    Reset,
}

impl LifecycleState {
    /// States in which the clock screen is shown and a run exists.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Reset)
    }
}

/// Everything needed to redraw or resume a run. This is what gets persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub state: LifecycleState,
    pub target_time: i64,
    pub started_time: i64,
    pub total_paused_duration: i64,
    pub last_paused_time: Option<i64>,
    pub threshold_time: i64,
    pub laps: LapLedger,
    pub settings: Option<TimerSettings>,
}

/// Upper bound for any instant or duration held in a snapshot (year 9999).
pub const MAX_SNAPSHOT_MS: i64 = 253_402_300_799_999;

impl TimerSnapshot {
    /// Whether the fields describe a run the timer can drive. Instants and
    /// durations must lie in `0..=MAX_SNAPSHOT_MS`, a pause instant exists
    /// exactly while paused and laps must chain.
    pub fn is_consistent(&self) -> bool {
        let in_range = |v: i64| (0..=MAX_SNAPSHOT_MS).contains(&v);
        let settings_in_range = self.settings.map_or(true, |s| {
            in_range(s.target_duration_ms) && in_range(s.threshold_duration_ms)
        });
        let laps_in_range = self
            .laps
            .laps()
            .iter()
            .all(|lap| in_range(lap.start_time) && in_range(lap.end_time));

        in_range(self.target_time)
            && in_range(self.started_time)
            && in_range(self.total_paused_duration)
            && in_range(self.threshold_time)
            && self.last_paused_time.map_or(true, in_range)
            && self.last_paused_time.is_some() == (self.state == LifecycleState::Paused)
            && settings_in_range
            && laps_in_range
            && self.laps.is_contiguous()
    }
}

/// What the Pause/Resume/Start control did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Paused,
    Resumed,
    Restarted,
}

/// Enablement and label of the clock controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonStates {
    pub pause_label: &'static str,
    pub pause_enabled: bool,
    pub split_enabled: bool,
    pub undo_enabled: bool,
    pub reset_enabled: bool,
}

impl ButtonStates {
    pub fn for_state(state: LifecycleState, laps_count: usize) -> Self {
        let mut buttons = Self {
            pause_label: "Pause",
            pause_enabled: true,
            split_enabled: true,
            undo_enabled: laps_count > 0,
            reset_enabled: true,
        };
        match state {
            LifecycleState::NotStarted | LifecycleState::Settings => {
                buttons.pause_enabled = false;
                buttons.split_enabled = false;
                buttons.reset_enabled = false;
            }
            LifecycleState::Running => {}
            LifecycleState::Paused => {
                buttons.pause_label = "Resume";
                buttons.split_enabled = false;
            }
            LifecycleState::Reset => {
                buttons.pause_label = "Start";
                buttons.split_enabled = false;
                buttons.reset_enabled = false;
            }
        }
        buttons
    }
}

/// Summary strings shown next to the clock. Empty when there is nothing to show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockParams {
    pub target: String,
    pub threshold: String,
    pub current_lap: String,
}

/// Countdown timer lifecycle and derived display values.
#[derive(Debug)]
pub struct CountdownTimer<C: Clock, S: Scheduler> {
    snapshot: TimerSnapshot,
    clock: C,
    scheduler: S,
    tick_interval: Duration,
    display: String,
    beyond_threshold: bool,
}

impl<C: Clock, S: Scheduler> CountdownTimer<C, S> {
    pub fn new(clock: C, scheduler: S, tick_interval: Duration) -> Self {
        Self {
            snapshot: TimerSnapshot::default(),
            clock,
            scheduler,
            tick_interval,
            display: INITIAL_DISPLAY.to_string(),
            beyond_threshold: false,
        }
    }

    /// Rebuild a timer from a restored snapshot. Ticking resumes for any
    /// state that has a run; a settings or not-started snapshot stays idle.
    pub fn from_snapshot(
        clock: C,
        scheduler: S,
        tick_interval: Duration,
        snapshot: TimerSnapshot,
    ) -> Self {
        let mut timer = Self::new(clock, scheduler, tick_interval);
        timer.snapshot = snapshot;
        if timer.snapshot.state.is_active() {
            timer.scheduler.cancel();
            timer.scheduler.start(timer.tick_interval);
        }
        timer.refresh_display();
        timer
    }

    pub fn snapshot(&self) -> &TimerSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> LifecycleState {
        self.snapshot.state
    }

    pub fn laps(&self) -> &[Lap] {
        self.snapshot.laps.laps()
    }

    pub fn settings(&self) -> Option<&TimerSettings> {
        self.snapshot.settings.as_ref()
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn is_beyond_threshold(&self) -> bool {
        self.beyond_threshold
    }

    pub fn is_ticking(&self) -> bool {
        self.scheduler.active().is_some()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// The instant derived values are computed at: frozen at the pause
    /// instant while paused, otherwise now.
    pub fn reference_time(&self) -> i64 {
        match (self.snapshot.state, self.snapshot.last_paused_time) {
            (LifecycleState::Paused, Some(paused_at)) => paused_at,
            _ => self.now(),
        }
    }

    /// Time left until the target, net of pauses. Negative once overrun.
    pub fn remaining_ms(&self) -> i64 {
        self.remaining_at(self.reference_time())
    }

    fn remaining_at(&self, reference: i64) -> i64 {
        let s = &self.snapshot;
        s.target_time - reference + s.total_paused_duration.max(0)
    }

    pub fn is_overflow(&self) -> bool {
        matches!(
            self.snapshot.state,
            LifecycleState::Running | LifecycleState::Paused
        ) && self.remaining_ms() < 0
    }

    pub fn current_lap_elapsed(&self) -> i64 {
        let s = &self.snapshot;
        s.laps
            .current_lap_elapsed(s.started_time, self.reference_time())
    }

    /// Begin a new run. Valid before the first run, from the settings view
    /// and from Reset.
    pub fn start(&mut self, settings: TimerSettings) -> Result<(), TimerError> {
        self.ensure(
            "start",
            &[
                LifecycleState::NotStarted,
                LifecycleState::Settings,
                LifecycleState::Reset,
            ],
        )?;
        let target_time = self.now() + settings.target_duration_ms;
        self.begin_run(settings, target_time);
        Ok(())
    }

    fn begin_run(&mut self, settings: TimerSettings, target_time: i64) {
        self.scheduler.cancel();

        let now = self.now();
        self.snapshot = TimerSnapshot {
            state: LifecycleState::Running,
            target_time,
            started_time: now,
            total_paused_duration: 0,
            last_paused_time: None,
            threshold_time: settings.threshold_duration_ms,
            laps: LapLedger::new(),
            settings: Some(settings),
        };
        let token = self.scheduler.start(self.tick_interval);
        info!(
            token = token.id(),
            target_ms = target_time - now,
            threshold_ms = settings.threshold_duration_ms,
            "run started"
        );
        self.refresh_display();
    }

    pub fn pause(&mut self) -> Result<(), TimerError> {
        self.ensure("pause", &[LifecycleState::Running])?;
        let now = self.now();
        self.snapshot.last_paused_time = Some(now);
        self.snapshot.state = LifecycleState::Paused;
        self.refresh_display();
        debug!(at = now, "paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), TimerError> {
        self.ensure("resume", &[LifecycleState::Paused])?;
        let now = self.now();
        let paused_at = self.snapshot.last_paused_time.take().unwrap_or(now);
        self.snapshot.total_paused_duration += (now - paused_at).max(0);
        self.snapshot.state = LifecycleState::Running;
        self.refresh_display();
        debug!(
            total_paused_ms = self.snapshot.total_paused_duration,
            "resumed"
        );
        Ok(())
    }

    /// Start again from Reset with the configured duration re-anchored at now.
    pub fn restart(&mut self) -> Result<(), TimerError> {
        self.ensure("restart", &[LifecycleState::Reset])?;
        let s = &self.snapshot;
        let duration = s.target_time - s.started_time;
        let settings = s.settings.unwrap_or(TimerSettings {
            target_duration_ms: duration,
            threshold_duration_ms: s.threshold_time,
        });
        let target_time = self.now() + duration;
        self.begin_run(settings, target_time);
        Ok(())
    }

    /// The single Pause/Resume/Start control.
    pub fn toggle(&mut self) -> Result<ToggleAction, TimerError> {
        match self.snapshot.state {
            LifecycleState::Running => self.pause().map(|_| ToggleAction::Paused),
            LifecycleState::Paused => self.resume().map(|_| ToggleAction::Resumed),
            LifecycleState::Reset => self.restart().map(|_| ToggleAction::Restarted),
            state => Err(TimerError::InvalidTransition {
                action: "toggle",
                state,
            }),
        }
    }

    pub fn split(&mut self) -> Result<Lap, TimerError> {
        self.ensure("split", &[LifecycleState::Running])?;
        let now = self.now();
        let started = self.snapshot.started_time;
        let lap = *self.snapshot.laps.split(started, now);
        debug!(
            lap = lap.sequence_number,
            duration_ms = lap.duration_ms,
            "split"
        );
        self.refresh_display();
        Ok(lap)
    }

    /// Drop the most recent lap, merging it back into the current one.
    pub fn undo(&mut self) -> Option<Lap> {
        let removed = self.snapshot.laps.undo();
        if let Some(lap) = &removed {
            debug!(lap = lap.sequence_number, "undo");
            self.refresh_display();
        }
        removed
    }

    /// Stop the run but keep its target so it can be restarted.
    pub fn reset(&mut self) -> Result<(), TimerError> {
        self.ensure("reset", &[LifecycleState::Running, LifecycleState::Paused])?;
        self.scheduler.cancel();

        let previous = std::mem::take(&mut self.snapshot);
        self.snapshot = TimerSnapshot {
            state: LifecycleState::Reset,
            target_time: previous.target_time,
            started_time: previous.started_time,
            threshold_time: previous.threshold_time,
            settings: previous.settings,
            ..TimerSnapshot::default()
        };
        info!("run reset");
        self.refresh_display();
        Ok(())
    }

    /// Leave the clock for the settings view. Nothing of the run is kept.
    pub fn change_settings(&mut self) -> Result<(), TimerError> {
        self.ensure(
            "change settings",
            &[
                LifecycleState::NotStarted,
                LifecycleState::Running,
                LifecycleState::Paused,
                LifecycleState::Reset,
            ],
        )?;
        self.scheduler.cancel();
        self.snapshot = TimerSnapshot {
            state: LifecycleState::Settings,
            ..TimerSnapshot::default()
        };
        info!("back to settings");
        self.refresh_display();
        Ok(())
    }

    /// Recompute the display string and threshold flag.
    pub fn tick(&mut self) {
        self.refresh_display();
    }

    fn refresh_display(&mut self) {
        let s = &self.snapshot;
        match s.state {
            LifecycleState::Running | LifecycleState::Paused => {
                let reference = self.reference_time();
                let lap_elapsed = s.laps.current_lap_elapsed(s.started_time, reference);
                self.display = format_duration(self.remaining_at(reference), true);
                self.beyond_threshold = is_beyond_threshold(lap_elapsed, s.threshold_time);
            }
            LifecycleState::Reset => {
                self.display = format_duration(s.target_time - s.started_time, true);
                self.beyond_threshold = false;
            }
            LifecycleState::NotStarted | LifecycleState::Settings => {
                self.display = INITIAL_DISPLAY.to_string();
                self.beyond_threshold = false;
            }
        }
    }

    pub fn button_states(&self) -> ButtonStates {
        ButtonStates::for_state(self.snapshot.state, self.snapshot.laps.len())
    }

    pub fn clock_params(&self) -> ClockParams {
        let Some(settings) = self.snapshot.settings.as_ref() else {
            return ClockParams::default();
        };
        let current_lap = if self.snapshot.state.is_active() {
            format_duration(self.current_lap_elapsed(), false)
        } else {
            String::new()
        };
        ClockParams {
            target: format_duration(settings.target_duration_ms, false),
            threshold: format_duration(settings.threshold_duration_ms, false),
            current_lap,
        }
    }

    fn ensure(
        &self,
        action: &'static str,
        allowed: &[LifecycleState],
    ) -> Result<(), TimerError> {
        if allowed.contains(&self.snapshot.state) {
            Ok(())
        } else {
            Err(TimerError::InvalidTransition {
                action,
                state: self.snapshot.state,
            })
        }
    }
}
