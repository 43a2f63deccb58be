use chrono::{Local, TimeZone};

const MS_PER_SECOND: i64 = 1000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Render a millisecond duration as `HH:MM:SS` or `HH:MM:SS.t`.
///
/// Hours are taken modulo a day, so durations of 24h or more wrap around.
/// Negative input is rendered as `"- "` followed by the absolute value.
pub fn format_duration(ms: i64, include_subsecond: bool) -> String {
    let abs = ms.unsigned_abs();
    let day = MS_PER_DAY as u64;

    let hours = (abs % day) / MS_PER_HOUR as u64;
    let minutes = (abs % MS_PER_HOUR as u64) / MS_PER_MINUTE as u64;
    let seconds = (abs % MS_PER_MINUTE as u64) / MS_PER_SECOND as u64;

    let mut out = format!(
        "{}:{}:{}",
        two_digits(hours),
        two_digits(minutes),
        two_digits(seconds)
    );
    if include_subsecond {
        let tenths = (abs % MS_PER_SECOND as u64) / 100;
        out.push_str(&format!(".{tenths}"));
    }

    if ms < 0 {
        format!("- {out}")
    } else {
        out
    }
}

pub fn two_digits(n: u64) -> String {
    format!("{n:02}")
}

/// Local wall-clock time of day for an epoch-millisecond timestamp.
pub fn format_timestamp(epoch_ms: i64) -> String {
    match Local.timestamp_millis_opt(epoch_ms).single() {
        Some(t) => t.format("%H:%M:%S").to_string(),
        None => String::new(),
    }
}
