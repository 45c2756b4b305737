use std::sync::Arc;

use vusermgr::{User, constants::SALT_ALPHABET, crypt::verify_password};

use crate::helpers::*;

/// `alice:$1$<8 salt chars>$<22 chars>`
fn assert_md5_line(line: &str, username: &str) {
    let (name, digest) = line.split_once(':').expect("line has no separator");
    assert_eq!(name, username);
    assert_eq!(digest.len(), 34, "digest {digest:?}");
    assert!(digest.starts_with("$1$"));
    assert!(digest[3..11].bytes().all(|b| SALT_ALPHABET.contains(&b)));
    assert_eq!(&digest[11..12], "$");
    assert!(!digest[12..].contains('\n'));
}

#[tokio::test]
async fn test_alice_lifecycle() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    engine.save(&User::new("alice", "hunter22")).await.unwrap();

    assert_eq!(engine.list().await.unwrap(), vec![User::named("alice")]);
    let lines = env.credential_lines();
    assert_eq!(lines.len(), 1);
    assert_md5_line(&lines[0], "alice");
    let digest = lines[0].split_once(':').unwrap().1;
    assert!(verify_password("hunter22", digest));
    assert!(env.home("alice").is_dir());

    engine.delete(&User::named("alice")).await.unwrap();

    assert!(engine.list().await.unwrap().is_empty());
    assert_eq!(env.credential_content(), "");
    assert!(!env.home("alice").exists());
    engine.close().await.unwrap();
}

#[tokio::test]
async fn test_header_survives_delete() {
    let env = TestEnv::new();
    let engine = env
        .engine_with(env.config().with_header(["managed by vusermgr, do not edit"]))
        .await;

    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    engine.delete(&User::named("alice")).await.unwrap();

    assert_eq!(env.credential_content(), "# managed by vusermgr, do not edit\n");
}

#[tokio::test]
async fn test_list_hides_passwords() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    for name in ["dave", "carol", "bobby", "alice"] {
        engine.save(&User::new(name, "hunter22")).await.unwrap();
    }

    let users = engine.list().await.unwrap();
    let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["alice", "bobby", "carol", "dave"]);
    assert!(users.iter().all(|u| u.password.is_none() && u.tree.is_none()));
}

#[tokio::test]
async fn test_short_fields_rejected_without_changes() {
    let env = TestEnv::new();
    let engine = env.engine().await;
    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    let before_list = engine.list().await.unwrap();
    let before_file = env.credential_content();

    for user in [
        User::new("bob", "hunter22"),
        User::new("bobby", "abc"),
        User::new("", ""),
    ] {
        let err = engine.save(&user).await.unwrap_err();
        assert!(err.is_invalid_user());
    }

    assert_eq!(engine.list().await.unwrap(), before_list);
    assert_eq!(env.credential_content(), before_file);
    assert!(!env.home("bob").exists());
    assert!(!env.home("bobby").exists());
}

#[tokio::test]
async fn test_save_twice_converges() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    engine.save(&User::new("alice", "hunter22")).await.unwrap();

    assert_eq!(engine.list().await.unwrap().len(), 1);
    let lines = env.credential_lines();
    assert_eq!(lines.len(), 1);
    assert_md5_line(&lines[0], "alice");
}

#[tokio::test]
async fn test_password_change_replaces_line() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    engine.save(&User::new("alice", "correct horse")).await.unwrap();

    let lines = env.credential_lines();
    assert_eq!(lines.len(), 1);
    let digest = lines[0].split_once(':').unwrap().1;
    assert!(verify_password("correct horse", digest));
    assert!(!verify_password("hunter22", digest));
}

#[tokio::test]
async fn test_delete_missing_user_succeeds() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    engine.delete(&User::named("ghost")).await.unwrap();
    // Names below the save minimum can still be removed
    engine.delete(&User::named("bob")).await.unwrap();

    let err = engine.delete(&User::named("../users")).await.unwrap_err();
    assert!(err.is_invalid_user());
    assert!(env.root().is_dir());
}

#[tokio::test]
async fn test_concurrent_saves_are_serialized() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    let names: Vec<String> = (0..16).map(|i| format!("user{i:02}")).collect();
    let mut tasks = Vec::new();
    for name in &names {
        let engine = engine.clone();
        let user = User::new(name.clone(), "hunter22");
        tasks.push(tokio::spawn(async move { engine.save(&user).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let lines = env.credential_lines();
    let in_file: Vec<&str> = lines.iter().map(|l| l.split_once(':').unwrap().0).collect();
    assert_eq!(in_file, names.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(engine.list().await.unwrap().len(), names.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_operations() {
    let env = TestEnv::new();
    let engine = Arc::new(env.engine().await);

    engine.save(&User::new("keeper", "hunter22")).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            let name = format!("temp{i}");
            engine.save(&User::new(name.clone(), "hunter22")).await?;
            engine.sync().await?;
            engine.delete(&User::named(name)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let lines = env.credential_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("keeper:"));
    assert!(!env.home("temp0").exists());
}
