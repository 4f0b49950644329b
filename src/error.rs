/// Error types for Tab Muter
use crate::tab_data::TabId;
use log::{error, warn};
use thiserror::Error;

/// Everything that can go wrong while reconciling tab mute state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuteError {
    #[error("tab {0} no longer exists")]
    TabNotFound(TabId),

    #[error("browser call failed: {0}")]
    Host(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("initialization failed: {0}")]
    NotInitialized(String),
}

impl MuteError {
    /// Whether the failure is an expected race with the browser (tab closed
    /// mid-operation, bad user pattern) rather than a broken extension.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MuteError::TabNotFound(_)
                | MuteError::Host(_)
                | MuteError::InvalidPattern { .. }
                | MuteError::UnknownCommand(_)
        )
    }
}

impl From<serde_json::Error> for MuteError {
    fn from(err: serde_json::Error) -> Self {
        MuteError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MuteError>;

/// Log a contained failure at the level its kind deserves
pub fn log_failure(context: &str, err: &MuteError) {
    if err.is_transient() {
        warn!("{}: {}", context, err);
    } else {
        error!("{}: {}", context, err);
    }
}
