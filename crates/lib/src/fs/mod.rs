//! Directory tree materialization
//!
//! A [`DirTree`] declares a directory layout with permission bits and ownership.
//! [`materialize`] turns it into real directories under a root, refusing any node whose
//! resolved path leaves that root. The builder is forward-only: a failure part way through
//! leaves the already created ancestors in place, and re-running the same tree converges.

mod errors;

use std::fs::{self, Permissions};
use std::io::ErrorKind;
use std::os::unix::fs::{PermissionsExt, lchown};
use std::path::{Component, Path, PathBuf};

use nix::unistd::{Group, User};
use serde::{Deserialize, Deserializer, Serialize};

pub use errors::FsError;

use crate::Result;
use crate::constants::DEFAULT_DIR_MODE;

/// Declarative description of a directory and its children.
///
/// Serialized as `{"name": "...", "mode": "0750", "owner": "...", "group": "...", "children": [...]}`.
/// `mode` accepts either a number or an octal string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirTree {
    /// Name relative to the parent node. Must be empty for the top-level node.
    #[serde(default)]
    pub name: String,
    /// Permission bits; [`DEFAULT_DIR_MODE`] when unset.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_mode"
    )]
    pub mode: Option<u32>,
    /// Owning user name, resolved through the host identity database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Owning group name, resolved through the host identity database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Nested directories, created in order after this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DirTree>,
}

impl DirTree {
    /// A nameless root node with default mode and untouched ownership.
    pub fn new() -> Self {
        Self::default()
    }

    /// A named child node.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_child(mut self, child: DirTree) -> Self {
        self.children.push(child);
        self
    }

    /// Effective permission bits of this node.
    pub fn effective_mode(&self) -> u32 {
        self.mode.unwrap_or(DEFAULT_DIR_MODE)
    }
}

fn deserialize_mode<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Mode {
        Number(u32),
        Octal(String),
    }

    match Option::<Mode>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Mode::Number(n)) => Ok(Some(n)),
        Some(Mode::Octal(s)) => {
            let digits = s.trim_start_matches("0o");
            u32::from_str_radix(digits, 8)
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid octal mode {s:?}")))
        }
    }
}

/// Lexically clean a path: fold `.` and `..` without consulting the filesystem.
///
/// `..` above a root directory stays at the root; `..` above a relative start is kept.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Materialize `tree` under `root`.
///
/// The top-level node resolves to `root` itself. Each node is created (with missing
/// ancestors), given its mode and ownership, and only then are its children processed.
///
/// # Errors
/// - [`FsError::RootNameNotBlank`] if the top-level node is named
/// - [`FsError::BlankName`] for an unnamed child
/// - [`FsError::PathEscape`] if a node resolves outside `root`; nothing is created for it
/// - [`FsError::UnknownOwner`] / [`FsError::UnknownGroup`] for unresolvable identities
/// - [`FsError::Io`] for any filesystem failure
pub fn materialize(root: impl AsRef<Path>, tree: &DirTree) -> Result<()> {
    if !tree.name.is_empty() {
        return Err(FsError::RootNameNotBlank {
            name: tree.name.clone(),
        }
        .into());
    }
    let root = clean_path(root.as_ref());
    materialize_node(&root, root.clone(), tree)
}

fn materialize_node(root: &Path, path: PathBuf, node: &DirTree) -> Result<()> {
    if !path.starts_with(root) {
        return Err(FsError::PathEscape {
            path,
            root: root.to_path_buf(),
        }
        .into());
    }

    create_dir(&path, node.effective_mode())?;
    apply_ownership(&path, node)?;

    for child in &node.children {
        if child.name.is_empty() {
            return Err(FsError::BlankName { parent: path }.into());
        }
        let child_path = clean_path(&path.join(&child.name));
        materialize_node(root, child_path, child)?;
    }
    Ok(())
}

fn create_dir(path: &Path, mode: u32) -> Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(FsError::io(path, e).into()),
    }

    // Never chmod through a symlink planted in place of the directory.
    let meta = fs::symlink_metadata(path).map_err(|e| FsError::io(path, e))?;
    if !meta.is_dir() {
        return Err(FsError::NotADirectory {
            path: path.to_path_buf(),
        }
        .into());
    }

    if meta.permissions().mode() & 0o7777 != mode {
        fs::set_permissions(path, Permissions::from_mode(mode))
            .map_err(|e| FsError::io(path, e))?;
    }
    Ok(())
}

fn apply_ownership(path: &Path, node: &DirTree) -> Result<()> {
    if node.owner.is_none() && node.group.is_none() {
        return Ok(());
    }

    let uid = node.owner.as_deref().map(resolve_owner).transpose()?;
    let gid = node.group.as_deref().map(resolve_group).transpose()?;

    tracing::debug!(path = %path.display(), ?uid, ?gid, "Applying ownership");
    lchown(path, uid, gid).map_err(|e| FsError::io(path, e))?;
    Ok(())
}

fn resolve_owner(name: &str) -> Result<u32> {
    let user = User::from_name(name)
        .map_err(|source| FsError::IdentityLookup {
            name: name.to_string(),
            source,
        })?
        .ok_or_else(|| FsError::UnknownOwner {
            name: name.to_string(),
        })?;
    Ok(user.uid.as_raw())
}

fn resolve_group(name: &str) -> Result<u32> {
    let group = Group::from_name(name)
        .map_err(|source| FsError::IdentityLookup {
            name: name.to_string(),
            source,
        })?
        .ok_or_else(|| FsError::UnknownGroup {
            name: name.to_string(),
        })?;
    Ok(group.gid.as_raw())
}

/// Make sure `root` is a directory, creating it with [`DEFAULT_DIR_MODE`] when missing.
///
/// Uses `lstat`, so a symlink in place of the root is rejected.
pub fn ensure_root(root: impl AsRef<Path>) -> Result<()> {
    let root = root.as_ref();
    match fs::symlink_metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(FsError::NotADirectory {
            path: root.to_path_buf(),
        }
        .into()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(root = %root.display(), "Creating missing user root");
            create_dir(root, DEFAULT_DIR_MODE)
        }
        Err(e) => Err(FsError::io(root, e).into()),
    }
}

/// Recursively remove `path`. A missing path is not an error.
pub fn remove_tree(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(FsError::io(path, e).into()),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FsError::io(path, e).into()),
    }
}

/// Names of the entries directly under `root`.
pub fn list_entries(root: impl AsRef<Path>) -> Result<Vec<String>> {
    let root = root.as_ref();
    let mut names = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| FsError::io(root, e))? {
        let entry = entry.map_err(|e| FsError::io(root, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
