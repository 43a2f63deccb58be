//! Event pump for the clock screen: terminal input arrives on a channel and
//! every quiet interval becomes a tick.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};
use tracing::debug;

#[derive(Clone, Debug)]
pub enum TimerEvent {
    Key(KeyEvent),
    Resize,
    Tick,
    /// The input side hung up. No further keys will arrive.
    InputClosed,
}

pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<TimerEvent, RecvTimeoutError>;
}

/// Events fed through an mpsc channel, either from the terminal reader
/// thread or by hand in headless runs.
pub struct ChannelEventSource {
    rx: Receiver<TimerEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<TimerEvent>) -> Self {
        Self { rx }
    }

    /// Spawn a thread forwarding key presses and resizes from the terminal.
    pub fn terminal() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                // release and repeat would double every action on some terminals
                Ok(CtEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                    tx.send(TimerEvent::Key(key))
                }
                Ok(CtEvent::Resize(_, _)) => tx.send(TimerEvent::Resize),
                Ok(_) => Ok(()),
                Err(err) => {
                    debug!(error = %err, "terminal event reader stopped");
                    break;
                }
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self::new(rx)
    }
}

impl EventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TimerEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Turns an [`EventSource`] into a stream of events paced by the tick interval.
pub struct Runner<E: EventSource> {
    source: E,
    interval: Duration,
}

impl<E: EventSource> Runner<E> {
    pub fn new(source: E, interval: Duration) -> Self {
        Self { source, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait up to one interval for input. A quiet interval is a Tick; a
    /// disconnected source is reported as `InputClosed` instead of a tick,
    /// since it would otherwise return at once on every call.
    pub fn step(&self) -> TimerEvent {
        match self.source.recv_timeout(self.interval) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => TimerEvent::Tick,
            Err(RecvTimeoutError::Disconnected) => TimerEvent::InputClosed,
        }
    }
}
