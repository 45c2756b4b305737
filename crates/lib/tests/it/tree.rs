use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use vusermgr::{DirTree, User, fs::materialize};

use crate::helpers::*;

fn mode_of(path: &Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[tokio::test]
async fn test_save_materializes_user_tree() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    let tree = DirTree::new()
        .with_mode(0o750)
        .with_child(DirTree::named("upload").with_mode(0o770))
        .with_child(DirTree::named("pub/docs").with_mode(0o555));
    engine
        .save(&User::new("alice", "hunter22").with_tree(tree))
        .await
        .unwrap();

    let home = env.home("alice");
    assert_eq!(mode_of(&home), 0o750);
    assert_eq!(mode_of(&home.join("upload")), 0o770);
    assert_eq!(mode_of(&home.join("pub/docs")), 0o555);
}

#[tokio::test]
async fn test_default_tree_applies_without_user_tree() {
    let env = TestEnv::new();
    let default_tree = DirTree::new().with_child(DirTree::named("incoming").with_mode(0o733));
    let engine = env
        .engine_with(env.config().with_default_tree(default_tree))
        .await;

    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    assert_eq!(mode_of(&env.home("alice").join("incoming")), 0o733);

    // A user supplied tree replaces the default entirely
    engine
        .save(&User::new("bobby", "hunter22").with_tree(DirTree::new()))
        .await
        .unwrap();
    assert!(env.home("bobby").is_dir());
    assert!(!env.home("bobby").join("incoming").exists());
}

#[tokio::test]
async fn test_escaping_tree_is_rejected() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    let tree = DirTree::new().with_child(DirTree::named("../../escape"));
    let err = engine
        .save(&User::new("alice", "hunter22").with_tree(tree))
        .await
        .unwrap_err();

    assert!(err.is_path_escape());
    assert!(err.is_client_error());
    assert!(!env.dir.path().join("escape").exists());
    // The store was never written
    assert!(engine.list().await.unwrap().is_empty());
    assert!(env.credential_lines().is_empty());
}

#[test]
fn test_escape_next_to_root() {
    // Root /tmp/<scratch>/x with a "../escape" child must leave /tmp/<scratch>/escape alone
    let scratch = tempfile::tempdir().unwrap();
    let root = scratch.path().join("x");

    let err = materialize(&root, &DirTree::new().with_child(DirTree::named("../escape")))
        .unwrap_err();

    assert!(err.is_path_escape());
    assert!(!scratch.path().join("escape").exists());
}

#[test]
fn test_nested_dot_dot_stays_inside() {
    let scratch = tempfile::tempdir().unwrap();
    let root = scratch.path().join("x");

    let tree = DirTree::new().with_child(
        DirTree::named("a/b")
            .with_mode(0o755)
            .with_child(DirTree::named("c").with_mode(0o555))
            .with_child(DirTree::named("../c")),
    );
    materialize(&root, &tree).unwrap();

    assert_eq!(mode_of(&root.join("a/b/c")), 0o555);
    assert!(root.join("a/c").is_dir());
}

#[tokio::test]
async fn test_tree_from_json() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    let user: User = serde_json::from_str(
        r#"{
            "username": "alice",
            "password": "hunter22",
            "tree": {"mode": "0700", "children": [{"name": "files", "mode": "0750"}]}
        }"#,
    )
    .unwrap();
    engine.save(&user).await.unwrap();

    assert_eq!(mode_of(&env.home("alice")), 0o700);
    assert_eq!(mode_of(&env.home("alice").join("files")), 0o750);
}
