use std::time::Duration;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::TimerError;
use crate::laps::Lap;
use crate::persistence::{BlobStore, SnapshotStore};
use crate::scheduler::Scheduler;
use crate::settings::TimerSettings;
use crate::timer::{CountdownTimer, ToggleAction};

/// One timer session: the countdown plus the store it is persisted to.
///
/// Created once at startup and passed around by `&mut`. Store failures are
/// logged and never interrupt the timer.
#[derive(Debug)]
pub struct Session<C: Clock, S: Scheduler, B: BlobStore> {
    timer: CountdownTimer<C, S>,
    store: SnapshotStore<B>,
    restored: bool,
}

impl<C: Clock, S: Scheduler, B: BlobStore> Session<C, S, B> {
    /// Resume from the store's snapshot if there is a usable one, otherwise
    /// begin fresh.
    pub fn open(clock: C, scheduler: S, blobs: B, tick_interval: Duration) -> Self {
        let mut store = SnapshotStore::new(blobs);
        match store.restore(clock.now_ms()) {
            Some(snapshot) => {
                info!(state = %snapshot.state, laps = snapshot.laps.len(), "resumed saved session");
                Self {
                    timer: CountdownTimer::from_snapshot(clock, scheduler, tick_interval, snapshot),
                    store,
                    restored: true,
                }
            }
            None => Self::fresh(clock, scheduler, store.into_blobs(), tick_interval),
        }
    }

    /// Begin without looking at any saved snapshot.
    pub fn fresh(clock: C, scheduler: S, blobs: B, tick_interval: Duration) -> Self {
        Self {
            timer: CountdownTimer::new(clock, scheduler, tick_interval),
            store: SnapshotStore::new(blobs),
            restored: false,
        }
    }

    pub fn timer(&self) -> &CountdownTimer<C, S> {
        &self.timer
    }

    pub fn store(&self) -> &SnapshotStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SnapshotStore<B> {
        &mut self.store
    }

    pub fn was_restored(&self) -> bool {
        self.restored
    }

    pub fn is_ticking(&self) -> bool {
        self.timer.is_ticking()
    }

    /// Start a new run. Any previous snapshot is dropped first.
    pub fn start(&mut self, settings: TimerSettings) -> Result<(), TimerError> {
        self.timer.start(settings)?;
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear saved snapshot");
        }
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<ToggleAction, TimerError> {
        let action = self.timer.toggle()?;
        if action == ToggleAction::Restarted {
            if let Err(err) = self.store.clear() {
                warn!(error = %err, "failed to clear saved snapshot");
            }
        }
        Ok(action)
    }

    pub fn split(&mut self) -> Result<Lap, TimerError> {
        self.timer.split()
    }

    pub fn undo(&mut self) -> Option<Lap> {
        self.timer.undo()
    }

    /// Reset the run. Ticking stops, so the reset state is saved here.
    pub fn reset(&mut self) -> Result<(), TimerError> {
        self.timer.reset()?;
        self.persist();
        Ok(())
    }

    /// Go back to the settings view. Saved so a restart lands there too.
    pub fn change_settings(&mut self) -> Result<(), TimerError> {
        self.timer.change_settings()?;
        self.persist();
        Ok(())
    }

    /// Advance one tick: refresh derived values and save the snapshot.
    /// Does nothing while no tick is scheduled.
    pub fn tick(&mut self) -> bool {
        if !self.timer.is_ticking() {
            return false;
        }
        self.timer.tick();
        self.persist();
        true
    }

    fn persist(&mut self) {
        let now = self.timer.now();
        if let Err(err) = self.store.save(self.timer.snapshot(), now) {
            warn!(error = %err, "failed to save snapshot");
        }
    }
}
