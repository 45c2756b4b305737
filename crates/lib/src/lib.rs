//!
//! vusermgr: virtual user management for vsftpd-style services.
//! This library keeps a flat credential file and per-user directory trees in sync with
//! an authoritative SQL store.
//!
//! ## Core Concepts
//!
//! * **Engine (`engine::Engine`)**: The synchronization engine. Serializes every mutation,
//!   regenerates the credential file and keeps user home directories in step with the store.
//! * **Stores (`store::UserStore`)**: A pluggable record store. SQLite and PostgreSQL are
//!   provided through sqlx, plus an in-memory store for tests and ephemeral deployments.
//! * **Credential file (`pwdfile`)**: The derived `username:digest` file, replaced through an
//!   atomic temp-file and rename protocol so readers never see partial content.
//! * **Directory trees (`fs::DirTree`)**: Declarative per-user directory layouts, materialized
//!   with permissions and ownership and confined to the user's root.
//! * **Digests (`crypt`)**: Salted crypt(3)-compatible password digests.
//! * **Exclusivity guard (`guard`)**: An advisory lock preventing two engines from managing
//!   the same credential file.

pub mod constants;
pub mod crypt;
pub mod engine;
pub mod fs;
pub mod guard;
pub mod pwdfile;
pub mod store;

pub use engine::{Engine, EngineConfig, ReconcileReport, User};
pub use fs::DirTree;

/// Result type used throughout the vusermgr library.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Transport layers branch on this instead of matching individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller supplied an invalid user; fixable by correcting the input.
    InvalidUser,
    /// The record store failed or timed out.
    Store,
    /// A directory tree tried to leave its root.
    PathEscape,
    /// A filesystem path could not be validated, created, replaced or removed.
    Path,
    /// The password digest primitive failed.
    Digest,
    /// Another writer kept the credential temp file busy past the retry window.
    ConcurrentSync,
    /// Another engine already manages the credential file.
    AlreadyRunning,
    /// The engine has been closed.
    Closed,
}

/// Common error type for the vusermgr library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured digest errors from the crypt module
    #[error(transparent)]
    Crypt(crypt::CryptError),

    /// Structured filesystem errors from the fs module
    #[error(transparent)]
    Fs(fs::FsError),

    /// Structured store errors from the store module
    #[error(transparent)]
    Store(store::StoreError),

    /// Structured credential file errors from the pwdfile module
    #[error(transparent)]
    PwdFile(pwdfile::PwdFileError),

    /// Structured exclusivity guard errors from the guard module
    #[error(transparent)]
    Guard(guard::GuardError),

    /// Structured engine errors from the engine module
    #[error(transparent)]
    Engine(engine::EngineError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Crypt(_) => "crypt",
            Error::Fs(_) => "fs",
            Error::Store(_) => "store",
            Error::PwdFile(_) => "pwdfile",
            Error::Guard(_) => "guard",
            Error::Engine(_) => "engine",
        }
    }

    /// Classify this error into the closed [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Crypt(_) => ErrorKind::Digest,
            Error::Fs(fs_err) if fs_err.is_path_escape() => ErrorKind::PathEscape,
            Error::Fs(fs_err) if fs_err.is_invalid_tree() => ErrorKind::InvalidUser,
            Error::Fs(_) => ErrorKind::Path,
            Error::Store(_) => ErrorKind::Store,
            Error::PwdFile(pwd_err) if pwd_err.is_concurrent_sync() => ErrorKind::ConcurrentSync,
            Error::PwdFile(_) => ErrorKind::Path,
            Error::Guard(guard_err) if guard_err.is_already_running() => ErrorKind::AlreadyRunning,
            Error::Guard(_) => ErrorKind::Path,
            Error::Engine(engine_err) => engine_err.kind(),
        }
    }

    /// Check if this error was caused by invalid caller input.
    pub fn is_invalid_user(&self) -> bool {
        self.kind() == ErrorKind::InvalidUser
    }

    /// Check if this error is store-related.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }

    /// Check if this error is a root boundary violation.
    pub fn is_path_escape(&self) -> bool {
        self.kind() == ErrorKind::PathEscape
    }

    /// Check if this error indicates credential file contention.
    pub fn is_concurrent_sync(&self) -> bool {
        self.kind() == ErrorKind::ConcurrentSync
    }

    /// Check if this error indicates another engine holds the guard.
    pub fn is_already_running(&self) -> bool {
        self.kind() == ErrorKind::AlreadyRunning
    }

    /// Check if this error was returned by a closed engine.
    pub fn is_closed(&self) -> bool {
        self.kind() == ErrorKind::Closed
    }

    /// Check if the caller can fix this error by changing its request.
    ///
    /// Everything else is a server-side fault whose details belong in logs only.
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidUser | ErrorKind::PathEscape)
    }
}
