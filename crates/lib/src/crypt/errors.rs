//! Error types for password digests
use thiserror::Error;

/// Errors raised while computing password digests.
///
/// Messages never include the password or the digest.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CryptError {
    #[error("Invalid salt for scheme {scheme}: {reason}")]
    InvalidSalt {
        scheme: &'static str,
        reason: String,
    },

    #[error("Digest computation failed: {reason}")]
    DigestFailed { reason: String },
}

impl CryptError {
    /// Check if this error was caused by a malformed salt.
    pub fn is_invalid_salt(&self) -> bool {
        matches!(self, CryptError::InvalidSalt { .. })
    }
}

impl From<CryptError> for crate::Error {
    fn from(err: CryptError) -> Self {
        crate::Error::Crypt(err)
    }
}
