//! Credential file serialization and replacement
//!
//! The credential file is a derived view of the store: optional `# ` header lines, then one
//! `username:digest` line per user in byte order of the username. It is never edited in
//! place. Each regeneration writes `<target>__new__`, moves the current file to
//! `<target>__old__`, renames the new file over the target and drops the backup. A reader
//! therefore sees either the complete old content or the complete new content.
//!
//! A crash part way through leaves the backup and/or temp file behind; [`recover`] puts
//! the directory back into a state the next swap can start from.

mod errors;

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub use errors::PwdFileError;

use crate::Result;
use crate::constants::{
    BACKUP_SUFFIX, CREDENTIAL_FILE_MODE, SYNC_RETRY_INTERVAL, SYNC_RETRY_TIMEOUT, TEMP_SUFFIX,
};
use crate::store::UserRecord;

fn with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `<target>__new__`, the file the next content is written to.
pub fn temp_path(target: &Path) -> PathBuf {
    with_suffix(target, TEMP_SUFFIX)
}

/// `<target>__old__`, the previous content while a swap is in flight.
pub fn backup_path(target: &Path) -> PathBuf {
    with_suffix(target, BACKUP_SUFFIX)
}

/// Serialize records into credential file content.
///
/// Records are sorted by username; the input order does not matter. Multi-line header
/// entries become one comment line each.
pub fn render(header: &[String], records: &[UserRecord]) -> String {
    let mut sorted: Vec<&UserRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.username.cmp(&b.username));

    let mut out = String::new();
    for line in header.iter().flat_map(|h| h.lines()) {
        out.push_str("# ");
        out.push_str(line);
        out.push('\n');
    }
    for record in sorted {
        out.push_str(&record.username);
        out.push(':');
        out.push_str(&record.password_digest);
        out.push('\n');
    }
    out
}

/// Create an empty credential file if none exists.
pub fn ensure_exists(target: &Path) -> Result<()> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(CREDENTIAL_FILE_MODE)
        .open(target)
    {
        Ok(_) => {
            tracing::info!(path = %target.display(), "Created empty credential file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(PwdFileError::io("create", target, e).into()),
    }
}

/// Clean up after an interrupted swap.
///
/// - backup present, target missing: the backup is moved back into place
/// - backup and target present: the backup is stale and removed
/// - a leftover temp file is removed
///
/// Only safe while no other writer can be mid-swap on the same target.
pub fn recover(target: &Path) -> Result<()> {
    let backup = backup_path(target);
    let temp = temp_path(target);

    if exists(&backup)? {
        if exists(target)? {
            tracing::warn!(path = %backup.display(), "Removing stale credential backup");
            fs::remove_file(&backup).map_err(|e| PwdFileError::io("remove backup", &backup, e))?;
        } else {
            tracing::warn!(path = %target.display(), "Restoring credential file from backup");
            fs::rename(&backup, target)
                .map_err(|e| PwdFileError::io("restore backup", &backup, e))?;
        }
    }

    if exists(&temp)? {
        tracing::warn!(path = %temp.display(), "Removing stale credential temp file");
        fs::remove_file(&temp).map_err(|e| PwdFileError::io("remove temp", &temp, e))?;
    }
    Ok(())
}

fn exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PwdFileError::io("stat", path, e).into()),
    }
}

/// How long to wait for a temp file held by another writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: SYNC_RETRY_INTERVAL,
            timeout: SYNC_RETRY_TIMEOUT,
        }
    }
}

/// Atomically replace the credential file at `target` with `content`.
///
/// Blocks the calling thread, including while waiting out a busy temp file.
///
/// # Errors
/// - [`PwdFileError::ConcurrentSync`] if the temp file exists for the whole retry window
/// - [`PwdFileError::Io`] for any failed step; the previous content stays in place.
///   If the target cannot be moved aside, the written temp file is left for [`recover`].
pub fn write_credentials(target: &Path, content: &str, retry: RetryPolicy) -> Result<()> {
    replace_with(target, content, retry, |from, to| fs::rename(from, to))
}

/// [`write_credentials`] with the rename primitive supplied by the caller.
fn replace_with<R>(target: &Path, content: &str, retry: RetryPolicy, rename: R) -> Result<()>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    let temp = temp_path(target);
    let backup = backup_path(target);

    let mut file = create_temp(&temp, retry)?;
    if let Err(e) = write_temp(&mut file, &temp, content) {
        drop(file);
        discard(&temp);
        return Err(e);
    }
    drop(file);

    let backed_up = match rename(target, &backup) {
        Ok(()) => true,
        // First run, or the target was lost; the new file still goes in place
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        // The target is intact; the temp file stays for the next recovery pass
        Err(e) => return Err(PwdFileError::io("rename target to backup", target, e).into()),
    };

    if let Err(e) = rename(&temp, target) {
        if backed_up && let Err(restore) = rename(&backup, target) {
            tracing::error!(
                path = %backup.display(),
                error = %restore,
                "Failed to restore credential backup"
            );
        }
        discard(&temp);
        return Err(PwdFileError::io("rename temp to target", &temp, e).into());
    }

    if backed_up && let Err(e) = fs::remove_file(&backup) {
        tracing::warn!(path = %backup.display(), error = %e, "Failed to remove credential backup");
    }

    sync_parent(target);
    Ok(())
}

fn create_temp(temp: &Path, retry: RetryPolicy) -> Result<File> {
    let started = Instant::now();
    loop {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(CREDENTIAL_FILE_MODE)
            .open(temp)
        {
            Ok(file) => return Ok(file),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let waited = started.elapsed();
                if waited >= retry.timeout {
                    return Err(PwdFileError::ConcurrentSync {
                        path: temp.to_path_buf(),
                        waited,
                    }
                    .into());
                }
                tracing::debug!(path = %temp.display(), "Credential temp file busy, waiting");
                thread::sleep(retry.interval.min(retry.timeout - waited));
            }
            Err(e) => return Err(PwdFileError::io("create temp", temp, e).into()),
        }
    }
}

fn write_temp(file: &mut File, temp: &Path, content: &str) -> Result<()> {
    // The umask may have narrowed the creation mode
    file.set_permissions(Permissions::from_mode(CREDENTIAL_FILE_MODE))
        .map_err(|e| PwdFileError::io("chmod temp", temp, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| PwdFileError::io("write temp", temp, e))?;
    file.sync_all()
        .map_err(|e| PwdFileError::io("sync temp", temp, e))?;
    Ok(())
}

fn discard(temp: &Path) {
    if let Err(e) = fs::remove_file(temp)
        && e.kind() != ErrorKind::NotFound
    {
        tracing::warn!(path = %temp.display(), error = %e, "Failed to remove credential temp file");
    }
}

fn sync_parent(target: &Path) {
    let Some(parent) = target.parent() else {
        return;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::warn!(path = %parent.display(), error = %e, "Failed to sync credential directory");
    }
}
