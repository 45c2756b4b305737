//! Process-exclusivity guard
//!
//! Only one engine may manage a given credential file. The default guard takes a
//! non-blocking advisory lock on a sidecar `<target>.lock` file; the credential file
//! itself is replaced by rename on every sync, so locking it would pin a stale inode.
//!
//! The lock is tied to the open file handle, so a crashed process releases it with
//! its descriptors.

mod errors;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

pub use errors::GuardError;

use crate::Result;
use crate::constants::LOCK_SUFFIX;

/// Something that prevents two engines from managing the same credential file.
pub trait ExclusivityGuard: Send + Sync {
    /// Claim exclusive management of `target`.
    ///
    /// # Errors
    /// [`GuardError::AlreadyRunning`] when another holder exists.
    fn acquire(&self, target: &Path) -> Result<Box<dyn Lease>>;
}

/// Proof of exclusive management, held until released.
pub trait Lease: Send + Sync + std::fmt::Debug {
    /// Give up the claim. Consumes the lease so it can only happen once.
    fn release(self: Box<Self>) -> Result<()>;
}

/// Path of the sidecar lock file for a credential file.
pub fn lock_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Advisory `flock`-style lock on `<target>.lock`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockFileGuard;

impl ExclusivityGuard for LockFileGuard {
    fn acquire(&self, target: &Path) -> Result<Box<dyn Lease>> {
        let path = lock_path(target);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| GuardError::Io {
                path: path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                return Err(GuardError::AlreadyRunning { path }.into());
            }
            Err(source) => return Err(GuardError::Io { path, source }.into()),
        }

        tracing::debug!(lock = %path.display(), "Acquired exclusivity lock");
        Ok(Box::new(FileLease { file, path }))
    }
}

#[derive(Debug)]
struct FileLease {
    file: File,
    path: PathBuf,
}

impl Lease for FileLease {
    fn release(self: Box<Self>) -> Result<()> {
        FileExt::unlock(&self.file).map_err(|source| GuardError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(lock = %self.path.display(), "Released exclusivity lock");
        Ok(())
    }
}

/// A guard that never refuses. Disables process exclusivity entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGuard;

impl ExclusivityGuard for NoGuard {
    fn acquire(&self, _target: &Path) -> Result<Box<dyn Lease>> {
        Ok(Box::new(NoLease))
    }
}

#[derive(Debug)]
struct NoLease;

impl Lease for NoLease {
    fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
