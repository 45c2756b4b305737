//! Record store adapter
//!
//! The store is the authoritative list of users. The credential file and the per-user
//! directories are derived from it, so the engine only ever reads the full record set
//! back from here when regenerating them.
//!
//! ## Implementations
//!
//! - [`SqlxStore`] (features `sqlite` / `postgres`): a `users` table through sqlx's `AnyPool`
//! - [`InMemory`]: a map behind an async lock, for tests and throwaway deployments

mod errors;
mod in_memory;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use errors::StoreError;
pub use in_memory::InMemory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::SqlxStore;

use crate::Result;

/// One row of the `users` table.
///
/// `password_digest` is a crypt(3) digest, never a plaintext password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_digest: String,
}

impl UserRecord {
    pub fn new(username: impl Into<String>, password_digest: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_digest: password_digest.into(),
        }
    }
}

/// Persistence interface for user records.
///
/// All implementations must be `Send + Sync`; the engine shares one store behind its lock
/// and never issues overlapping calls.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create the `users` table if it does not exist. Idempotent.
    async fn ensure_schema(&self) -> Result<()>;

    /// All user records, in no particular order.
    async fn list_all(&self) -> Result<Vec<UserRecord>>;

    /// Insert the user, or replace the digest of an existing one.
    async fn upsert(&self, username: &str, password_digest: &str) -> Result<()>;

    /// Remove the user. Removing an absent user is not an error.
    async fn delete(&self, username: &str) -> Result<()>;

    /// Release connections held by the store.
    async fn close(&self) -> Result<()>;

    /// Short name for logs, e.g. `sqlite` or `inmemory`.
    fn kind(&self) -> &'static str;
}
