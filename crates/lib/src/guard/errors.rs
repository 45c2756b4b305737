//! Error types for the process-exclusivity guard.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while acquiring or releasing the exclusivity lock.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GuardError {
    /// Another process already holds the lock for this credential file.
    #[error("Another instance is already managing {path}")]
    AlreadyRunning {
        /// The lock file that is held elsewhere
        path: PathBuf,
    },

    /// The lock file could not be opened, locked or unlocked.
    #[error("Lock file I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GuardError {
    /// Check if this error means another instance holds the lock.
    pub fn is_already_running(&self) -> bool {
        matches!(self, GuardError::AlreadyRunning { .. })
    }
}

impl From<GuardError> for crate::Error {
    fn from(err: GuardError) -> Self {
        crate::Error::Guard(err)
    }
}
