//! SQL schema definition.
//!
//! The single `users` table is portable between SQLite and PostgreSQL.

use crate::Result;
use crate::store::StoreError;

use super::SqlxStore;

/// Column widths match what pam_pwdfile style consumers accept.
pub const CREATE_USERS: &str = "CREATE TABLE IF NOT EXISTS users (
    username VARCHAR(32) NOT NULL PRIMARY KEY,
    password VARCHAR(128) NOT NULL
)";

/// Create the `users` table if it does not exist. Safe to call repeatedly.
pub async fn initialize(store: &SqlxStore) -> Result<()> {
    sqlx::query(CREATE_USERS)
        .execute(store.pool())
        .await
        .map_err(|e| StoreError::Sqlx {
            reason: format!("Schema creation failed: {e}"),
            source: Some(e),
        })?;
    Ok(())
}
