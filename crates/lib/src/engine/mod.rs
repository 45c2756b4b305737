//! Synchronization engine.
//!
//! The engine owns one record store, one user root and one credential file. Every public
//! operation runs under a single async mutex, so the credential file and the directory
//! tree always move from one consistent state to the next. Filesystem work runs on the
//! blocking pool while that mutex is held.
//!
//! Mutating operations run on their own task. Dropping the caller's future does not cut
//! one short while it holds the lock; it completes and the next operation waits for it.
//!
//! Mutations touch the filesystem first and the store second. A failed store write can
//! leave an extra home directory behind, never a stored user without one; repeating the
//! call converges.

mod errors;
mod user;

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use handle_trait::Handle;
use tokio::sync::Mutex;

pub use errors::EngineError;
pub use user::{User, validate_password, validate_username, validate_username_shape};

use crate::Result;
use crate::constants::{SYNC_RETRY_INTERVAL, SYNC_RETRY_TIMEOUT};
use crate::crypt::{DigestProvider, DigestScheme, SaltGenerator};
use crate::fs::{self, DirTree};
use crate::guard::{ExclusivityGuard, Lease, LockFileGuard, NoGuard, lock_path};
use crate::pwdfile::{self, RetryPolicy};
use crate::store::{StoreError, UserRecord, UserStore};

/// Settings for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding one home directory per user.
    pub root: PathBuf,
    /// The credential file consumed by the FTP service.
    pub credential_file: PathBuf,
    /// Comment lines written at the top of the credential file.
    pub header: Vec<String>,
    /// Layout for users that do not bring their own tree.
    pub default_tree: Option<DirTree>,
    /// Poll interval while another writer holds the credential temp file.
    pub sync_retry_interval: Duration,
    /// Give up on a busy credential temp file after this long.
    pub sync_retry_timeout: Duration,
    /// Deadline for each store call; unbounded when `None`.
    pub store_timeout: Option<Duration>,
    /// Digest scheme for new passwords.
    pub scheme: DigestScheme,
    /// Fixed salt seed, for reproducible digests in tests.
    pub salt_seed: Option<u64>,
    /// Hold the exclusivity lock on the credential file.
    pub exclusive: bool,
}

impl EngineConfig {
    pub fn new(root: impl Into<PathBuf>, credential_file: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            credential_file: credential_file.into(),
            header: Vec::new(),
            default_tree: None,
            sync_retry_interval: SYNC_RETRY_INTERVAL,
            sync_retry_timeout: SYNC_RETRY_TIMEOUT,
            store_timeout: None,
            scheme: DigestScheme::default(),
            salt_seed: None,
            exclusive: true,
        }
    }

    pub fn with_header(mut self, header: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.header = header.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_tree(mut self, tree: DirTree) -> Self {
        self.default_tree = Some(tree);
        self
    }

    pub fn with_sync_retry(mut self, interval: Duration, timeout: Duration) -> Self {
        self.sync_retry_interval = interval;
        self.sync_retry_timeout = timeout;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    pub fn with_scheme(mut self, scheme: DigestScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_salt_seed(mut self, seed: u64) -> Self {
        self.salt_seed = Some(seed);
        self
    }

    /// Skip the exclusivity lock. Concurrent writers are then only held off by the
    /// credential temp file.
    pub fn without_guard(mut self) -> Self {
        self.exclusive = false;
        self
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: self.sync_retry_interval,
            timeout: self.sync_retry_timeout,
        }
    }
}

/// Outcome of [`Engine::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Users whose missing home directory was created.
    pub created: Vec<String>,
    /// Directory entries under the root that belonged to no user and were removed.
    pub removed: Vec<String>,
}

struct EngineState {
    lease: Option<Box<dyn Lease>>,
    closed: bool,
}

pub(crate) struct EngineInternal {
    config: EngineConfig,
    store: Arc<dyn UserStore>,
    digests: DigestProvider,
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for EngineInternal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineInternal")
            .field("config", &self.config)
            .field("store", &self.store.kind())
            .field("scheme", &self.digests.scheme())
            .finish()
    }
}

/// Virtual user synchronization engine.
///
/// `Engine` is a cheap-to-clone handle; clones share the same lock, store and lease.
///
/// ## Example
///
/// ```
/// # use vusermgr::{Engine, EngineConfig, User, store::InMemory};
/// # #[tokio::main]
/// # async fn main() -> vusermgr::Result<()> {
/// let dir = tempfile::tempdir().unwrap();
/// let config = EngineConfig::new(dir.path().join("users"), dir.path().join("passwd"));
/// let engine = Engine::open(config, Box::new(InMemory::new())).await?;
///
/// engine.save(&User::new("alice", "hunter22")).await?;
/// assert_eq!(engine.list().await?, vec![User::named("alice")]);
///
/// engine.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Handle)]
pub struct Engine {
    inner: Arc<EngineInternal>,
}

impl Engine {
    /// Open an engine over `store`.
    ///
    /// Prepares the schema, the user root and the credential file, and claims the
    /// credential file with [`LockFileGuard`] unless the config disables the guard.
    ///
    /// # Errors
    /// - store errors from schema creation
    /// - [`FsError`](crate::fs::FsError) if the root exists but is not a directory
    /// - [`GuardError::AlreadyRunning`](crate::guard::GuardError) if another engine manages the file
    pub async fn open(config: EngineConfig, store: Box<dyn UserStore>) -> Result<Self> {
        let guard: Arc<dyn ExclusivityGuard> = if config.exclusive {
            Arc::new(LockFileGuard)
        } else {
            Arc::new(NoGuard)
        };
        Self::open_with_guard(config, store, guard).await
    }

    /// Open an engine with a caller supplied exclusivity guard.
    pub async fn open_with_guard(
        config: EngineConfig,
        store: Box<dyn UserStore>,
        guard: Arc<dyn ExclusivityGuard>,
    ) -> Result<Self> {
        let store: Arc<dyn UserStore> = Arc::from(store);
        with_deadline(config.store_timeout, "ensure_schema", store.ensure_schema()).await?;

        let root = config.root.clone();
        let target = config.credential_file.clone();
        let recover = config.exclusive;
        let lease = blocking("open", move || {
            fs::ensure_root(&root)?;
            let lease = guard.acquire(&target)?;
            if recover {
                pwdfile::recover(&target)?;
            }
            pwdfile::ensure_exists(&target)?;
            Ok(lease)
        })
        .await?;

        let salts = match config.salt_seed {
            Some(seed) => SaltGenerator::seeded(seed),
            None => SaltGenerator::new(),
        };

        tracing::info!(
            root = %config.root.display(),
            credential_file = %config.credential_file.display(),
            store = store.kind(),
            exclusive = config.exclusive,
            "Engine opened"
        );

        Ok(Self {
            inner: Arc::new(EngineInternal {
                digests: DigestProvider::new(config.scheme, salts),
                config,
                store,
                state: Mutex::new(EngineState {
                    lease: Some(lease),
                    closed: false,
                }),
            }),
        })
    }

    /// The configuration this engine was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Check whether [`close`](Self::close) has been called.
    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.closed
    }

    /// All users, sorted by username, without passwords.
    pub async fn list(&self) -> Result<Vec<User>> {
        let state = self.inner.state.lock().await;
        ensure_open(&state)?;

        let mut records = self.list_records().await?;
        records.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(records
            .into_iter()
            .map(|r| User::named(r.username))
            .collect())
    }

    /// Create the user or change its password.
    ///
    /// Materializes the user's home tree, stores the digest and regenerates the
    /// credential file. Invalid input is rejected before anything is touched.
    pub async fn save(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.detached("save", move |engine| async move { engine.save_locked(&user).await })
            .await
    }

    async fn save_locked(&self, user: &User) -> Result<()> {
        let state = self.inner.state.lock().await;
        ensure_open(&state)?;

        validate_username(&user.username)?;
        self.ensure_unreserved(&user.username)?;
        let password = validate_password(user.password.as_deref())?;
        let digest = self.inner.digests.hash_password(password)?;

        let home = self.home_of(&user.username);
        let tree = user
            .tree
            .clone()
            .or_else(|| self.inner.config.default_tree.clone())
            .unwrap_or_default();
        blocking("materialize", move || fs::materialize(&home, &tree)).await?;

        with_deadline(
            self.inner.config.store_timeout,
            "upsert",
            self.inner.store.upsert(&user.username, &digest),
        )
        .await?;

        self.regenerate().await?;
        tracing::info!(username = %user.username, "Saved user");
        Ok(())
    }

    /// Remove the user, its home tree and its credential line.
    ///
    /// Deleting a user that does not exist succeeds.
    pub async fn delete(&self, user: &User) -> Result<()> {
        let username = user.username.clone();
        self.detached("delete", move |engine| async move {
            engine.delete_locked(&username).await
        })
        .await
    }

    async fn delete_locked(&self, username: &str) -> Result<()> {
        let state = self.inner.state.lock().await;
        ensure_open(&state)?;

        validate_username_shape(username)?;
        self.ensure_unreserved(username)?;

        let home = self.home_of(username);
        blocking("remove home", move || fs::remove_tree(&home)).await?;

        with_deadline(
            self.inner.config.store_timeout,
            "delete",
            self.inner.store.delete(username),
        )
        .await?;

        self.regenerate().await?;
        tracing::info!(%username, "Deleted user");
        Ok(())
    }

    /// Regenerate the credential file from the store.
    pub async fn sync(&self) -> Result<()> {
        self.detached("sync", |engine| async move { engine.sync_locked().await })
            .await
    }

    async fn sync_locked(&self) -> Result<()> {
        let state = self.inner.state.lock().await;
        ensure_open(&state)?;
        self.regenerate().await
    }

    /// Bring the user root in line with the store, then regenerate the credential file.
    ///
    /// Stored users without a home get the default tree. Entries under the root that
    /// belong to no stored user are removed, except the credential file and its
    /// companions should they live there.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.detached("reconcile", |engine| async move { engine.reconcile_locked().await })
            .await
    }

    async fn reconcile_locked(&self) -> Result<ReconcileReport> {
        let state = self.inner.state.lock().await;
        ensure_open(&state)?;

        let records = self.list_records().await?;
        let mut usernames = BTreeSet::new();
        for record in records {
            if let Err(e) = validate_username_shape(&record.username) {
                tracing::warn!(username = %record.username, error = %e, "Skipping unusable stored username");
                continue;
            }
            usernames.insert(record.username);
        }

        let root = self.inner.config.root.clone();
        let keep = self.protected_entries();
        let tree = self.inner.config.default_tree.clone().unwrap_or_default();
        let report = blocking("reconcile", move || {
            reconcile_root(&root, &usernames, &keep, &tree)
        })
        .await?;

        self.regenerate().await?;
        tracing::info!(
            created = report.created.len(),
            removed = report.removed.len(),
            "Reconciled user root"
        );
        Ok(report)
    }

    /// Release the exclusivity lock and close the store.
    ///
    /// Cleanup failures are logged, not returned. Every later call fails with
    /// [`EngineError::Closed`].
    pub async fn close(&self) -> Result<()> {
        self.detached("close", |engine| async move { engine.close_locked().await })
            .await
    }

    async fn close_locked(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        ensure_open(&state)?;
        state.closed = true;

        if let Some(lease) = state.lease.take()
            && let Err(e) = lease.release()
        {
            tracing::warn!(error = %e, "Failed to release exclusivity lock");
        }
        if let Err(e) = self.inner.store.close().await {
            tracing::warn!(error = %e, "Failed to close store");
        }

        tracing::info!(credential_file = %self.inner.config.credential_file.display(), "Engine closed");
        Ok(())
    }

    /// Run `body` on its own task and wait for it.
    async fn detached<T, F, Fut>(&self, operation: &'static str, body: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Engine) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        tokio::spawn(body(self.handle()))
            .await
            .map_err(|e| EngineError::TaskFailed {
                operation,
                reason: e.to_string(),
            })?
    }

    /// The credential file and its companions may share the root; no user may take their names.
    fn ensure_unreserved(&self, username: &str) -> Result<()> {
        if self.protected_entries().contains(username) {
            return Err(EngineError::invalid(format!(
                "username {username:?} is reserved for the credential file"
            ))
            .into());
        }
        Ok(())
    }

    fn home_of(&self, username: &str) -> PathBuf {
        self.inner.config.root.join(username)
    }

    /// Names under the root that must survive a reconcile.
    fn protected_entries(&self) -> BTreeSet<String> {
        let config = &self.inner.config;
        let target = &config.credential_file;
        [
            target.clone(),
            pwdfile::temp_path(target),
            pwdfile::backup_path(target),
            lock_path(target),
        ]
        .iter()
        .filter(|p| p.parent() == Some(config.root.as_path()))
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
    }

    async fn list_records(&self) -> Result<Vec<UserRecord>> {
        with_deadline(
            self.inner.config.store_timeout,
            "list_all",
            self.inner.store.list_all(),
        )
        .await
    }

    /// Rewrite the credential file from the store. Caller holds the state lock.
    async fn regenerate(&self) -> Result<()> {
        let records = self.list_records().await?;
        let content = pwdfile::render(&self.inner.config.header, &records);

        let target = self.inner.config.credential_file.clone();
        let retry = self.inner.config.retry_policy();
        let recover = self.inner.config.exclusive;
        blocking("write credentials", move || {
            if recover {
                pwdfile::recover(&target)?;
            }
            pwdfile::write_credentials(&target, &content, retry)
        })
        .await?;

        tracing::debug!(users = records.len(), "Credential file regenerated");
        Ok(())
    }
}

fn ensure_open(state: &EngineState) -> Result<()> {
    if state.closed {
        return Err(EngineError::Closed.into());
    }
    Ok(())
}

fn reconcile_root(
    root: &Path,
    usernames: &BTreeSet<String>,
    keep: &BTreeSet<String>,
    tree: &DirTree,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for entry in fs::list_entries(root)? {
        if usernames.contains(&entry) || keep.contains(&entry) {
            continue;
        }
        tracing::info!(entry = %entry, "Removing orphaned user directory");
        fs::remove_tree(root.join(&entry))?;
        report.removed.push(entry);
    }

    for username in usernames {
        let home = root.join(username);
        if home.exists() {
            continue;
        }
        tracing::info!(username = %username, "Creating missing user directory");
        fs::materialize(&home, tree)?;
        report.created.push(username.clone());
    }

    Ok(report)
}

/// Run blocking filesystem work off the async executor.
async fn blocking<T, F>(operation: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EngineError::TaskFailed {
            operation,
            reason: e.to_string(),
        })?
}

/// Await a store call, abandoning it once `deadline` passes.
async fn with_deadline<T>(
    deadline: Option<Duration>,
    operation: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| StoreError::Timeout { operation })?,
        None => call.await,
    }
}
