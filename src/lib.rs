// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod laps;
pub mod logging;
pub mod persistence;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod timer;
