//! Error types for the record store adapter.

use thiserror::Error;

/// Errors that can occur while talking to the record store.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQL statement or connection failed.
    #[error("SQL error: {reason}")]
    Sqlx {
        /// Description of the failed operation, including the driver message
        reason: String,
        /// The underlying sqlx error, when one exists
        #[cfg(any(feature = "sqlite", feature = "postgres"))]
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A store call exceeded the configured deadline.
    #[error("Store operation {operation} timed out")]
    Timeout {
        /// The store operation that was abandoned
        operation: &'static str,
    },

    /// The store has been closed.
    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    /// Check if this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }

    /// Check if this error came from the SQL driver.
    pub fn is_sql_error(&self) -> bool {
        matches!(self, StoreError::Sqlx { .. })
    }
}

impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
