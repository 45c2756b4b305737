use std::time::{Duration, Instant};

use vusermgr::{
    User,
    pwdfile::{backup_path, temp_path},
};

use crate::helpers::*;

#[tokio::test]
async fn test_sync_is_byte_identical() {
    let env = TestEnv::new();
    let engine = env.engine().await;

    engine.save(&User::new("carol", "hunter22")).await.unwrap();
    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    engine.save(&User::new("bobby", "hunter22")).await.unwrap();
    engine.delete(&User::named("carol")).await.unwrap();
    let after_mutations = env.credential_content();

    engine.sync().await.unwrap();
    assert_eq!(env.credential_content(), after_mutations);
    engine.sync().await.unwrap();
    assert_eq!(env.credential_content(), after_mutations);

    let names: Vec<String> = env
        .credential_lines()
        .iter()
        .filter_map(|line| line.split_once(':'))
        .map(|(username, _)| username.to_string())
        .collect();
    assert_eq!(names, ["alice", "bobby"]);
}

#[tokio::test]
async fn test_sync_restores_lost_file() {
    let env = TestEnv::new();
    let engine = env.engine().await;
    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    let expected = env.credential_content();

    std::fs::remove_file(env.credential_file()).unwrap();
    engine.sync().await.unwrap();
    assert_eq!(env.credential_content(), expected);

    std::fs::write(env.credential_file(), "garbage\n").unwrap();
    engine.sync().await.unwrap();
    assert_eq!(env.credential_content(), expected);
}

#[tokio::test]
async fn test_sync_after_interrupted_swap() {
    let env = TestEnv::new();
    let engine = env.engine().await;
    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    let expected = env.credential_content();

    // Interrupted between moving the target aside and moving the new file in
    let target = env.credential_file();
    std::fs::rename(&target, backup_path(&target)).unwrap();
    std::fs::write(temp_path(&target), "alice:$1$trunc").unwrap();

    engine.sync().await.unwrap();

    assert_eq!(env.credential_content(), expected);
    assert_eq!(siblings(&env), ["passwd", "passwd.lock"]);
}

#[tokio::test]
async fn test_reopen_after_interrupted_swap() {
    let env = TestEnv::new();
    let target = env.credential_file();
    std::fs::write(backup_path(&target), "alice:$1$aaaaaaaa$previous\n").unwrap();
    std::fs::write(temp_path(&target), "partial").unwrap();

    let engine = env.engine().await;

    // Recovery on open puts the last complete file back in place
    assert_eq!(env.credential_content(), "alice:$1$aaaaaaaa$previous\n");
    assert_eq!(siblings(&env), ["passwd", "passwd.lock"]);
    engine.close().await.unwrap();
}

#[tokio::test]
async fn test_unguarded_engine_waits_then_gives_up() {
    let env = TestEnv::new();
    let config = env
        .config()
        .without_guard()
        .with_sync_retry(Duration::from_millis(20), Duration::from_millis(200));
    let engine = env.engine_with(config).await;
    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    let before = env.credential_content();

    // Another writer's temp file
    let temp = temp_path(&env.credential_file());
    std::fs::write(&temp, "in progress").unwrap();

    let started = Instant::now();
    let err = engine.sync().await.unwrap_err();
    assert!(err.is_concurrent_sync());
    assert!(started.elapsed() >= Duration::from_millis(200));

    assert_eq!(env.credential_content(), before);
    assert_eq!(read(&temp), "in progress");
    assert!(!env.dir.path().join("passwd.lock").exists());

    std::fs::remove_file(&temp).unwrap();
    engine.sync().await.unwrap();
}

#[tokio::test]
async fn test_unguarded_engine_proceeds_when_temp_clears() {
    let env = TestEnv::new();
    let engine = env.engine_with(env.config().without_guard()).await;

    let temp = temp_path(&env.credential_file());
    std::fs::write(&temp, "in progress").unwrap();
    let clear = {
        let temp = temp.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            std::fs::remove_file(temp).unwrap();
        })
    };

    engine.save(&User::new("alice", "hunter22")).await.unwrap();
    clear.await.unwrap();

    assert_eq!(env.credential_lines().len(), 1);
    assert!(!temp.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_credential_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnv::new();
    let engine = env.engine().await;
    engine.save(&User::new("alice", "hunter22")).await.unwrap();

    let mode = std::fs::metadata(env.credential_file())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o644);
}
