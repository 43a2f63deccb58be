use thiserror::Error;

use crate::settings::SettingsField;
use crate::timer::LifecycleState;

/// Rejected settings input. The messages are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Please enter a valid number")]
    NotANumber { field: SettingsField },

    #[error("Please enter a value between 0 and {max}")]
    OutOfRange { field: SettingsField, max: u32 },

    #[error("Please enter the Countdown Timer value")]
    MissingTarget,

    #[error("Please enter a Threshold value")]
    MissingThreshold,
}

impl SettingsError {
    /// The input field the error belongs to, if it is field-scoped.
    pub fn field(&self) -> Option<SettingsField> {
        match self {
            Self::NotANumber { field } | Self::OutOfRange { field, .. } => Some(*field),
            Self::MissingTarget | Self::MissingThreshold => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: LifecycleState,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
