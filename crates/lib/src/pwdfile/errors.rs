//! Error types for the credential file writer.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while regenerating the credential file.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PwdFileError {
    /// The temp file stayed in place for the whole retry window.
    #[error("Credential temp file {path} still busy after {waited:?}")]
    ConcurrentSync {
        /// The temp file path
        path: PathBuf,
        /// How long the writer waited
        waited: Duration,
    },

    /// A step of the swap failed.
    #[error("Credential file {step} failed at {path}")]
    Io {
        /// Short name of the failing step, e.g. `create temp` or `rename backup`
        step: &'static str,
        /// The path being operated on
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PwdFileError {
    pub(crate) fn io(step: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            step,
            path: path.into(),
            source,
        }
    }

    /// Check if this error is credential temp file contention.
    pub fn is_concurrent_sync(&self) -> bool {
        matches!(self, PwdFileError::ConcurrentSync { .. })
    }
}

impl From<PwdFileError> for crate::Error {
    fn from(err: PwdFileError) -> Self {
        crate::Error::PwdFile(err)
    }
}
