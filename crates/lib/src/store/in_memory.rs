//! In-memory user store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StoreError, UserRecord, UserStore};
use crate::Result;

/// A [`UserStore`] keeping records in a map.
///
/// Contents are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemory {
    users: RwLock<BTreeMap<String, String>>,
    closed: AtomicBool,
}

impl InMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store that already holds `records`.
    pub fn with_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let users = records
            .into_iter()
            .map(|r| (r.username, r.password_digest))
            .collect();
        Self {
            users: RwLock::new(users),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed.into());
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemory {
    async fn ensure_schema(&self) -> Result<()> {
        self.check_open()
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>> {
        self.check_open()?;
        let users = self.users.read().await;
        Ok(users
            .iter()
            .map(|(name, digest)| UserRecord::new(name.clone(), digest.clone()))
            .collect())
    }

    async fn upsert(&self, username: &str, password_digest: &str) -> Result<()> {
        self.check_open()?;
        self.users
            .write()
            .await
            .insert(username.to_string(), password_digest.to_string());
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<()> {
        self.check_open()?;
        self.users.write().await.remove(username);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "inmemory"
    }
}
