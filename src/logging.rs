use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "LAPCLOCK_LOG";

/// Install a file-backed subscriber. The terminal belongs to the TUI, so
/// nothing is written to stdout or stderr.
///
/// Returns the writer guard, which must be held until exit so buffered lines
/// are flushed. `None` if the log directory cannot be created or a global
/// subscriber is already set.
pub fn init_logging(path: &Path) -> Option<WorkerGuard> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name()?;
    fs::create_dir_all(dir).ok()?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .ok()?;

    Some(guard)
}
