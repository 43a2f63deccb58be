use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// One completed lap: the interval between two splits, or between the run
/// start and the first split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lap {
    pub sequence_number: u32,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_ms: i64,
}

impl Lap {
    pub fn is_beyond_threshold(&self, threshold_ms: i64) -> bool {
        is_beyond_threshold(self.duration_ms, threshold_ms)
    }
}

/// Append-only list of laps. Only the last lap can be removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LapLedger {
    laps: Vec<Lap>,
}

impl LapLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn laps(&self) -> &[Lap] {
        &self.laps
    }

    pub fn len(&self) -> usize {
        self.laps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.laps.is_empty()
    }

    pub fn last(&self) -> Option<&Lap> {
        self.laps.last()
    }

    pub fn clear(&mut self) {
        self.laps.clear();
    }

    /// Close the current lap at `now` and append it.
    ///
    /// A split at zero elapsed time still produces a lap; its end is clamped
    /// to its start so the duration never goes negative.
    pub fn split(&mut self, run_start: i64, now: i64) -> &Lap {
        let start_time = self.current_lap_start(run_start);
        let end_time = now.max(start_time);
        self.laps.push(Lap {
            sequence_number: self.laps.len() as u32 + 1,
            start_time,
            end_time,
            duration_ms: end_time - start_time,
        });
        &self.laps[self.laps.len() - 1]
    }

    pub fn undo(&mut self) -> Option<Lap> {
        self.laps.pop()
    }

    pub fn current_lap_elapsed(&self, run_start: i64, now: i64) -> i64 {
        let anchor = self.last().map_or(run_start, |lap| lap.end_time);
        now - anchor
    }

    /// Where the next lap will start: one past the last lap's end.
    pub fn current_lap_start(&self, run_start: i64) -> i64 {
        self.last().map_or(run_start, |lap| lap.end_time + 1)
    }

    /// Whether every lap satisfies the ledger invariants: numbering from 1,
    /// consecutive start/end times, and `duration = end - start >= 0`.
    pub fn is_contiguous(&self) -> bool {
        let numbered = self
            .laps
            .iter()
            .enumerate()
            .all(|(i, lap)| lap.sequence_number as usize == i + 1);
        let durations = self
            .laps
            .iter()
            .all(|lap| lap.duration_ms >= 0 && lap.duration_ms == lap.end_time - lap.start_time);
        let chained = self
            .laps
            .iter()
            .tuple_windows()
            .all(|(a, b)| b.start_time == a.end_time + 1);

        numbered && durations && chained
    }
}

pub fn is_beyond_threshold(elapsed_ms: i64, threshold_ms: i64) -> bool {
    elapsed_ms > threshold_ms
}
