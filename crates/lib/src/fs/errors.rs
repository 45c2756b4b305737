//! Error types for the directory tree materializer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while materializing or removing directory trees.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FsError {
    /// The top-level tree node carried a name; it is implied by the root.
    #[error("Name must be blank for the root node, got {name:?}")]
    RootNameNotBlank {
        /// The offending name
        name: String,
    },

    /// A nested tree node had an empty name.
    #[error("Blank node name under {parent}")]
    BlankName {
        /// Resolved path of the parent node
        parent: PathBuf,
    },

    /// A resolved path is outside the declared root.
    #[error("{path} is outside of {root} root")]
    PathEscape {
        /// The resolved, cleaned path
        path: PathBuf,
        /// The root every path must stay under
        root: PathBuf,
    },

    /// A path that must be a directory is something else.
    #[error("{path} exists and is not a directory")]
    NotADirectory {
        /// The offending path
        path: PathBuf,
    },

    /// Owner name unknown to the host identity database.
    #[error("Unknown owner: {name}")]
    UnknownOwner {
        /// The owner name
        name: String,
    },

    /// Group name unknown to the host identity database.
    #[error("Unknown group: {name}")]
    UnknownGroup {
        /// The group name
        name: String,
    },

    /// The host identity database could not be queried.
    #[error("Identity lookup failed for {name}")]
    IdentityLookup {
        /// The owner or group name being resolved
        name: String,
        /// The underlying errno
        #[source]
        source: nix::errno::Errno,
    },

    /// I/O error on a specific path.
    #[error("I/O error at {path}")]
    Io {
        /// The path being operated on
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this error is a root boundary violation.
    pub fn is_path_escape(&self) -> bool {
        matches!(self, FsError::PathEscape { .. })
    }

    /// Check if this error came from an owner or group lookup.
    pub fn is_identity_error(&self) -> bool {
        matches!(
            self,
            FsError::UnknownOwner { .. }
                | FsError::UnknownGroup { .. }
                | FsError::IdentityLookup { .. }
        )
    }

    /// Check if this error was caused by a malformed tree description.
    pub fn is_invalid_tree(&self) -> bool {
        matches!(
            self,
            FsError::RootNameNotBlank { .. } | FsError::BlankName { .. }
        )
    }

    /// Get the path this error refers to, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            FsError::BlankName { parent: path }
            | FsError::PathEscape { path, .. }
            | FsError::NotADirectory { path }
            | FsError::Io { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<FsError> for crate::Error {
    fn from(err: FsError) -> Self {
        crate::Error::Fs(err)
    }
}
