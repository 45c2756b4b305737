//! The user exchange type and its validation rules.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::EngineError;
use crate::constants::{MAX_USERNAME_LEN, MIN_PASSWORD_LEN, MIN_USERNAME_LEN};
use crate::fs::DirTree;

/// A virtual user as exchanged with callers.
///
/// The plaintext password only travels inward; [`Engine::list`](super::Engine::list) never
/// fills it. Username and password are wiped from memory when the value is dropped.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Directory layout for the user's home; the engine default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub tree: Option<DirTree>,
}

impl User {
    /// A user carrying only a name, as used for deletion and listing.
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            tree: None,
        }
    }

    /// A user with a password, ready to be saved.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            tree: None,
        }
    }

    pub fn with_tree(mut self, tree: DirTree) -> Self {
        self.tree = Some(tree);
        self
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tree", &self.tree)
            .finish()
    }
}

/// Reject names that could not appear in the credential file or as a single path component.
///
/// Length limits are left to [`validate_username`] so older short names can still be deleted.
pub fn validate_username_shape(username: &str) -> Result<(), EngineError> {
    if username.is_empty() {
        return Err(EngineError::invalid("username is empty"));
    }
    if username == "." || username == ".." {
        return Err(EngineError::invalid("username must not be a relative path"));
    }
    if let Some(c) = username
        .chars()
        .find(|c| matches!(c, '/' | ':' | '\0') || c.is_whitespace() || c.is_control())
    {
        return Err(EngineError::invalid(format!(
            "username contains forbidden character {c:?}"
        )));
    }
    Ok(())
}

/// Full username check applied before saving.
pub fn validate_username(username: &str) -> Result<(), EngineError> {
    validate_username_shape(username)?;
    let len = username.len();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(EngineError::invalid(format!(
            "username must be {MIN_USERNAME_LEN} to {MAX_USERNAME_LEN} bytes, got {len}"
        )));
    }
    Ok(())
}

/// Password check applied before saving. Error messages never echo the password.
pub fn validate_password(password: Option<&str>) -> Result<&str, EngineError> {
    let password = password.ok_or_else(|| EngineError::invalid("password is required"))?;
    if password.len() < MIN_PASSWORD_LEN {
        return Err(EngineError::invalid(format!(
            "password must be at least {MIN_PASSWORD_LEN} bytes"
        )));
    }
    if password.contains(['\n', '\r']) {
        return Err(EngineError::invalid("password must not contain line breaks"));
    }
    Ok(password)
}
