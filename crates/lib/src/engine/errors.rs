//! Error types for the synchronization engine.

use thiserror::Error;

use crate::ErrorKind;

/// Errors raised by [`Engine`](super::Engine) itself, as opposed to the modules it drives.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// The user failed validation. Nothing was changed.
    #[error("Invalid user: {reason}")]
    InvalidUser {
        /// What was wrong with the input; never contains the password
        reason: String,
    },

    /// The engine was closed.
    #[error("Engine is closed")]
    Closed,

    /// Blocking filesystem work panicked or was cancelled.
    #[error("Background task for {operation} failed: {reason}")]
    TaskFailed {
        /// The engine step that was running
        operation: &'static str,
        /// The join error message
        reason: String,
    },
}

impl EngineError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidUser {
            reason: reason.into(),
        }
    }

    /// Check if this error was caused by invalid user input.
    pub fn is_invalid_user(&self) -> bool {
        matches!(self, EngineError::InvalidUser { .. })
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidUser { .. } => ErrorKind::InvalidUser,
            EngineError::Closed => ErrorKind::Closed,
            EngineError::TaskFailed { .. } => ErrorKind::Path,
        }
    }
}

impl From<EngineError> for crate::Error {
    fn from(err: EngineError) -> Self {
        crate::Error::Engine(err)
    }
}
