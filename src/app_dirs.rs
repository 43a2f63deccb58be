use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "lapclock";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join(APP_NAME))
        } else {
            ProjectDirs::from("", "", APP_NAME)
                .map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    /// SQLite file holding the saved timer snapshot.
    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("state.db"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("lapclock.log"))
    }
}
