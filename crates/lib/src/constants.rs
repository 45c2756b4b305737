//! Constants shared across the vusermgr library.

use std::time::Duration;

/// Minimum accepted username length, in bytes.
pub const MIN_USERNAME_LEN: usize = 4;

/// Maximum accepted username length, in bytes. Matches the `users.username` column width.
pub const MAX_USERNAME_LEN: usize = 32;

/// Minimum accepted password length, in bytes.
pub const MIN_PASSWORD_LEN: usize = 4;

/// Permission bits applied to directories whose tree node declares no mode.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Permission bits of a freshly written credential file.
pub const CREDENTIAL_FILE_MODE: u32 = 0o644;

/// Suffix of the backup kept while the credential file is being swapped.
pub const BACKUP_SUFFIX: &str = "__old__";

/// Suffix of the temporary file the next credential file is written to.
pub const TEMP_SUFFIX: &str = "__new__";

/// Suffix of the sidecar file holding the exclusivity lock.
pub const LOCK_SUFFIX: &str = ".lock";

/// How often a busy credential temp file is re-checked.
pub const SYNC_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// How long a busy credential temp file is waited on before giving up.
pub const SYNC_RETRY_TIMEOUT: Duration = Duration::from_secs(3);

/// Length of generated crypt salts.
pub const SALT_LENGTH: usize = 8;

/// Alphabet crypt salts are drawn from.
pub const SALT_ALPHABET: &[u8; 64] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789./";
