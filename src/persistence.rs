//! Snapshot persistence across restarts.
//!
//! The timer snapshot lives in a small key-value blob store under two keys:
//! the JSON snapshot and the epoch-millisecond instant it was written. On
//! startup the gap since that instant is added back to the absolute
//! timestamps so the countdown continues as if the process had never stopped.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::timer::{LifecycleState, TimerSnapshot};

pub const STATE_KEY: &str = "counter_state";
pub const SAVED_ON_KEY: &str = "counter_state_saved_on";

/// Key-value store of string blobs. Multi-key writes and removals are atomic.
pub trait BlobStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<(), StoreError>;
    fn remove_many(&mut self, keys: &[&str]) -> Result<(), StoreError>;
}

/// SQLite-backed blob store.
#[derive(Debug)]
pub struct SqliteBlobStore {
    conn: Connection,
}

impl SqliteBlobStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self { conn })
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_many(&mut self, keys: &[&str]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// In-memory blob store, for tests and `--fresh` style throwaway sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    entries: HashMap<String, String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.entries.insert(key.to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&mut self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.entries.remove(*key);
        }
        Ok(())
    }
}

/// Reads and writes timer snapshots in a [`BlobStore`].
#[derive(Debug)]
pub struct SnapshotStore<B: BlobStore> {
    blobs: B,
}

impl<B: BlobStore> SnapshotStore<B> {
    pub fn new(blobs: B) -> Self {
        Self { blobs }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn blobs_mut(&mut self) -> &mut B {
        &mut self.blobs
    }

    pub fn into_blobs(self) -> B {
        self.blobs
    }

    /// Write the snapshot and its save instant together.
    pub fn save(&mut self, snapshot: &TimerSnapshot, saved_at: i64) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot)?;
        self.blobs.set_many(&[
            (STATE_KEY, json),
            (SAVED_ON_KEY, saved_at.to_string()),
        ])
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.blobs.remove_many(&[STATE_KEY, SAVED_ON_KEY])
    }

    /// Load the saved snapshot and shift it forward by the time since it was
    /// saved. Missing, unreadable or inconsistent data yields `None`.
    pub fn restore(&mut self, now: i64) -> Option<TimerSnapshot> {
        let (snapshot, saved_at) = match self.load() {
            Ok(Some(found)) => found,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "discarding unreadable snapshot");
                return None;
            }
        };
        if !snapshot.is_consistent() {
            warn!(state = %snapshot.state, "discarding inconsistent snapshot");
            return None;
        }
        let Some(gap) = now.checked_sub(saved_at) else {
            warn!(saved_at, "discarding snapshot with out of range save timestamp");
            return None;
        };

        debug!(gap_ms = gap, state = %snapshot.state, "restoring snapshot");
        let shifted = shift_snapshot(snapshot, gap, now).filter(TimerSnapshot::is_consistent);
        if shifted.is_none() {
            warn!(gap_ms = gap, "discarding snapshot that cannot be shifted to now");
        }
        shifted
    }

    fn load(&mut self) -> Result<Option<(TimerSnapshot, i64)>, StoreError> {
        let Some(json) = self.blobs.get(STATE_KEY)? else {
            return Ok(None);
        };
        let snapshot: TimerSnapshot = serde_json::from_str(&json)?;
        let saved_at = match self.blobs.get(SAVED_ON_KEY)? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(v) => v,
                Err(_) => {
                    warn!(raw = %raw, "unreadable save timestamp");
                    return Ok(None);
                }
            },
            None => {
                warn!("snapshot present without save timestamp");
                return Ok(None);
            }
        };
        Ok(Some((snapshot, saved_at)))
    }
}

/// Re-anchor a saved snapshot at `now`, treating the gap as ordinary
/// elapsed time. `None` when a shifted instant does not fit in an `i64`.
///
/// A Reset snapshot holds a duration rather than a live countdown, so its
/// target is re-anchored to keep `target - started` intact.
pub fn shift_snapshot(mut snapshot: TimerSnapshot, gap: i64, now: i64) -> Option<TimerSnapshot> {
    if snapshot.state == LifecycleState::Reset {
        let duration = snapshot.target_time.checked_sub(snapshot.started_time)?;
        snapshot.target_time = now.checked_add(duration)?;
    } else {
        snapshot.target_time = snapshot.target_time.checked_add(gap)?;
        if let Some(paused_at) = snapshot.last_paused_time.as_mut() {
            *paused_at = paused_at.checked_add(gap)?;
        }
    }
    snapshot.started_time = now;
    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laps::LapLedger;
    use tempfile::tempdir;

    const NOW: i64 = 1_700_000_100_000;

    fn running_snapshot() -> TimerSnapshot {
        TimerSnapshot {
            state: LifecycleState::Running,
            target_time: NOW + 60_000,
            started_time: NOW - 30_000,
            threshold_time: 10_000,
            ..TimerSnapshot::default()
        }
    }

    #[test]
    fn restore_without_snapshot_is_none() {
        let mut store = SnapshotStore::new(MemoryBlobStore::new());
        assert_eq!(store.restore(NOW), None);
    }

    #[test]
    fn restore_shifts_by_gap() {
        let mut store = SnapshotStore::new(MemoryBlobStore::new());
        let snapshot = running_snapshot();
        store.save(&snapshot, NOW - 10_000).unwrap();

        let restored = store.restore(NOW).unwrap();
        assert_eq!(restored.target_time, snapshot.target_time + 10_000);
        assert_eq!(restored.started_time, NOW);
        assert_eq!(restored.state, LifecycleState::Running);
    }

    #[test]
    fn restore_shifts_pause_instant() {
        let mut store = SnapshotStore::new(MemoryBlobStore::new());
        let snapshot = TimerSnapshot {
            state: LifecycleState::Paused,
            last_paused_time: Some(NOW - 12_000),
            ..running_snapshot()
        };
        store.save(&snapshot, NOW - 10_000).unwrap();

        let restored = store.restore(NOW).unwrap();
        assert_eq!(restored.last_paused_time, Some(NOW - 2_000));
        // frozen remaining time is unchanged by the gap
        assert_eq!(
            restored.target_time - restored.last_paused_time.unwrap(),
            snapshot.target_time - snapshot.last_paused_time.unwrap()
        );
    }

    #[test]
    fn restore_reset_keeps_configured_duration() {
        let snapshot = TimerSnapshot {
            state: LifecycleState::Reset,
            target_time: NOW + 50_000,
            started_time: NOW - 10_000,
            ..TimerSnapshot::default()
        };
        let shifted = shift_snapshot(snapshot, 5_000, NOW).unwrap();
        assert_eq!(shifted.target_time - shifted.started_time, 60_000);
    }

    #[test]
    fn corrupt_json_is_ignored() {
        let mut blobs = MemoryBlobStore::new();
        blobs
            .set_many(&[
                (STATE_KEY, "{not json".to_string()),
                (SAVED_ON_KEY, NOW.to_string()),
            ])
            .unwrap();
        let mut store = SnapshotStore::new(blobs);
        assert_eq!(store.restore(NOW), None);
    }

    #[test]
    fn bad_timestamp_is_ignored() {
        let mut blobs = MemoryBlobStore::new();
        let json = serde_json::to_string(&running_snapshot()).unwrap();
        blobs
            .set_many(&[(STATE_KEY, json), (SAVED_ON_KEY, "yesterday".to_string())])
            .unwrap();
        let mut store = SnapshotStore::new(blobs);
        assert_eq!(store.restore(NOW), None);
    }

    #[test]
    fn extreme_save_timestamp_is_ignored() {
        let mut blobs = MemoryBlobStore::new();
        let json = serde_json::to_string(&running_snapshot()).unwrap();
        blobs
            .set_many(&[(STATE_KEY, json), (SAVED_ON_KEY, i64::MIN.to_string())])
            .unwrap();
        let mut store = SnapshotStore::new(blobs);
        assert_eq!(store.restore(NOW), None);
    }

    #[test]
    fn extreme_target_time_is_ignored() {
        let mut store = SnapshotStore::new(MemoryBlobStore::new());
        let snapshot = TimerSnapshot {
            target_time: i64::MAX,
            ..running_snapshot()
        };
        store.save(&snapshot, NOW - 10).unwrap();
        assert_eq!(store.restore(NOW), None);
    }

    #[test]
    fn shift_past_i64_range_is_none() {
        let snapshot = running_snapshot();
        assert_eq!(shift_snapshot(snapshot.clone(), i64::MAX, NOW), None);

        let reset = TimerSnapshot {
            state: LifecycleState::Reset,
            target_time: i64::MAX,
            started_time: -1,
            ..snapshot
        };
        assert_eq!(shift_snapshot(reset, 0, NOW), None);
    }

    #[test]
    fn paused_snapshot_without_pause_instant_is_ignored() {
        let mut store = SnapshotStore::new(MemoryBlobStore::new());
        let snapshot = TimerSnapshot {
            state: LifecycleState::Paused,
            last_paused_time: None,
            ..running_snapshot()
        };
        store.save(&snapshot, NOW - 1_000).unwrap();
        assert_eq!(store.restore(NOW), None);
    }

    #[test]
    fn negative_paused_duration_is_ignored() {
        let mut store = SnapshotStore::new(MemoryBlobStore::new());
        let snapshot = TimerSnapshot {
            total_paused_duration: -5_000,
            ..running_snapshot()
        };
        store.save(&snapshot, NOW - 1_000).unwrap();
        assert_eq!(store.restore(NOW), None);
    }

    #[test]
    fn inconsistent_laps_are_ignored() {
        let json = r#"{"state":"Running","targetTime":1,"startedTime":0,
            "totalPausedDuration":0,"lastPausedTime":null,"thresholdTime":5,
            "laps":[{"sequenceNumber":2,"startTime":0,"endTime":10,"durationMs":10}],
            "settings":null}"#;
        let mut blobs = MemoryBlobStore::new();
        blobs
            .set_many(&[(STATE_KEY, json.to_string()), (SAVED_ON_KEY, NOW.to_string())])
            .unwrap();
        let mut store = SnapshotStore::new(blobs);
        assert_eq!(store.restore(NOW), None);
    }

    #[test]
    fn clear_removes_both_keys() {
        let mut store = SnapshotStore::new(MemoryBlobStore::new());
        store.save(&running_snapshot(), NOW).unwrap();
        store.clear().unwrap();

        assert_eq!(store.blobs_mut().get(STATE_KEY).unwrap(), None);
        assert_eq!(store.blobs_mut().get(SAVED_ON_KEY).unwrap(), None);
    }

    #[test]
    fn sqlite_store_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");

        let mut ledger = LapLedger::new();
        ledger.split(NOW - 30_000, NOW - 20_000);
        let snapshot = TimerSnapshot {
            laps: ledger,
            ..running_snapshot()
        };

        {
            let mut store = SnapshotStore::new(SqliteBlobStore::open(&path).unwrap());
            store.save(&snapshot, NOW).unwrap();
            // overwrite in place
            store.save(&snapshot, NOW).unwrap();
        }

        let mut store = SnapshotStore::new(SqliteBlobStore::open(&path).unwrap());
        assert_eq!(
            store.blobs_mut().get(SAVED_ON_KEY).unwrap(),
            Some(NOW.to_string())
        );
        let restored = store.restore(NOW).unwrap();
        assert_eq!(restored.laps, snapshot.laps);
        assert_eq!(restored.target_time, snapshot.target_time);
    }

    #[test]
    fn sqlite_remove_many() {
        let mut blobs = SqliteBlobStore::open_in_memory().unwrap();
        blobs
            .set_many(&[("a", "1".to_string()), ("b", "2".to_string())])
            .unwrap();
        blobs.remove_many(&["a", "b", "missing"]).unwrap();
        assert_eq!(blobs.get("a").unwrap(), None);
        assert_eq!(blobs.get("b").unwrap(), None);
    }
}
