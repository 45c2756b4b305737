//! Password digests for the credential file
//!
//! Digests use the crypt(3) modular format understood by `pam_pwdfile` and friends:
//! `$<scheme-id>$<salt>$<body>`. The hash primitive itself comes from `pwhash`; this
//! module owns salt generation and the scheme prefix.
//!
//! - MD5-crypt (`$1$`) is the default and produces 34 character digests
//! - SHA-512-crypt (`$6$`) is available for services whose crypt(3) supports it

mod errors;

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use pwhash::HashSetup;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

pub use errors::CryptError;

use crate::Result;
use crate::constants::{SALT_ALPHABET, SALT_LENGTH};

/// Length of an MD5-crypt digest: `$1$` + 8 salt characters + `$` + 22 body characters.
pub const MD5_DIGEST_LENGTH: usize = 34;

/// Supported crypt(3) schemes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestScheme {
    /// MD5-crypt, `$1$`
    #[default]
    Md5Crypt,
    /// SHA-512-crypt, `$6$`
    Sha512Crypt,
}

impl DigestScheme {
    /// The identifier between the first two `$` of a digest.
    pub fn id(&self) -> &'static str {
        match self {
            DigestScheme::Md5Crypt => "1",
            DigestScheme::Sha512Crypt => "6",
        }
    }

    /// Human readable scheme name.
    pub fn name(&self) -> &'static str {
        match self {
            DigestScheme::Md5Crypt => "md5-crypt",
            DigestScheme::Sha512Crypt => "sha512-crypt",
        }
    }

    /// Longest salt the scheme accepts.
    pub fn max_salt_len(&self) -> usize {
        match self {
            DigestScheme::Md5Crypt => 8,
            DigestScheme::Sha512Crypt => 16,
        }
    }

    /// The crypt(3) setting string for a salt, e.g. `$1$Bb6jzHiC$`.
    pub fn setting(&self, salt: &str) -> String {
        format!("${}${}$", self.id(), salt)
    }

    /// Digest `password` with `salt`.
    ///
    /// The salt must be non-empty, at most [`max_salt_len`](Self::max_salt_len) long and drawn
    /// from `[a-zA-Z0-9./]`.
    // pam_pwdfile style consumers only understand `$1$`, which pwhash marks deprecated
    #[allow(deprecated)]
    pub fn digest(&self, password: impl AsRef<str>, salt: impl AsRef<str>) -> Result<String> {
        let salt = salt.as_ref();
        self.validate_salt(salt)?;

        let setup = HashSetup {
            salt: Some(salt),
            rounds: None,
        };
        let password = password.as_ref().as_bytes();
        let digest = match self {
            DigestScheme::Md5Crypt => pwhash::md5_crypt::hash_with(setup, password),
            DigestScheme::Sha512Crypt => pwhash::sha512_crypt::hash_with(setup, password),
        }
        .map_err(|e| CryptError::DigestFailed {
            reason: format!("{} primitive failed: {e}", self.name()),
        })?;

        if !digest.starts_with(&self.setting(salt)) {
            return Err(CryptError::DigestFailed {
                reason: format!("{} primitive returned a malformed digest", self.name()),
            }
            .into());
        }
        Ok(digest)
    }

    fn validate_salt(&self, salt: &str) -> Result<()> {
        let invalid = |reason: String| CryptError::InvalidSalt {
            scheme: self.name(),
            reason,
        };
        if salt.is_empty() {
            return Err(invalid("salt is empty".to_string()).into());
        }
        if salt.len() > self.max_salt_len() {
            return Err(invalid(format!(
                "salt is {} characters, at most {} allowed",
                salt.len(),
                self.max_salt_len()
            ))
            .into());
        }
        if let Some(c) = salt.bytes().find(|b| !SALT_ALPHABET.contains(b)) {
            return Err(invalid(format!("character {:?} is not allowed", c as char)).into());
        }
        Ok(())
    }
}

impl std::fmt::Display for DigestScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Random salt source.
///
/// Not cryptographically secure; the digest scheme carries the security properties. Each
/// engine owns its own generator so independent instances never share state.
#[derive(Debug)]
pub struct SaltGenerator {
    rng: Mutex<StdRng>,
}

impl SaltGenerator {
    /// Create a generator seeded from the high-resolution system clock.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::seeded(seed)
    }

    /// Create a generator with a fixed seed, producing a reproducible salt sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Produce a fresh [`SALT_LENGTH`] character salt from `[a-zA-Z0-9./]`.
    pub fn random_salt(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        (0..SALT_LENGTH)
            .map(|_| SALT_ALPHABET[rng.gen_range(0..SALT_ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for SaltGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A digest scheme paired with the salt generator feeding it.
#[derive(Debug, Default)]
pub struct DigestProvider {
    scheme: DigestScheme,
    salts: SaltGenerator,
}

impl DigestProvider {
    pub fn new(scheme: DigestScheme, salts: SaltGenerator) -> Self {
        Self { scheme, salts }
    }

    pub fn scheme(&self) -> DigestScheme {
        self.scheme
    }

    /// Produce a fresh salt.
    pub fn random_salt(&self) -> String {
        self.salts.random_salt()
    }

    /// Digest `password` with an explicit salt.
    pub fn digest(&self, password: impl AsRef<str>, salt: impl AsRef<str>) -> Result<String> {
        self.scheme.digest(password, salt)
    }

    /// Digest `password` with a freshly generated salt.
    ///
    /// # Returns
    /// `$<scheme-id>$<salt>$<body>`, e.g. a 34 character string for MD5-crypt.
    pub fn hash_password(&self, password: impl AsRef<str>) -> Result<String> {
        let salt = self.random_salt();
        self.digest(password, salt)
    }
}

/// Check `password` against a stored crypt(3) digest of any supported scheme.
pub fn verify_password(password: impl AsRef<str>, digest: impl AsRef<str>) -> bool {
    pwhash::unix::verify(password.as_ref(), digest.as_ref())
}
