use std::sync::Arc;

use vusermgr::{Engine, User, guard::NoGuard, store::InMemory};

use crate::helpers::*;

#[tokio::test]
async fn test_second_engine_refused() {
    let env = TestEnv::new();
    let first = env.engine().await;

    let err = Engine::open(env.config(), test_store().await)
        .await
        .unwrap_err();
    assert!(err.is_already_running());
    assert_eq!(err.kind(), vusermgr::ErrorKind::AlreadyRunning);

    // The refused engine changed nothing
    first.save(&User::new("alice", "hunter22")).await.unwrap();
    assert_eq!(env.credential_lines().len(), 1);
    first.close().await.unwrap();
}

#[tokio::test]
async fn test_reopen_after_close() {
    let env = TestEnv::new();

    let first = env.engine().await;
    first.close().await.unwrap();

    let second = env.engine().await;
    second.save(&User::new("alice", "hunter22")).await.unwrap();
    second.close().await.unwrap();
}

#[tokio::test]
async fn test_reopen_after_drop() {
    let env = TestEnv::new();

    let first = env.engine().await;
    drop(first);

    let second = env.engine().await;
    second.close().await.unwrap();
}

#[tokio::test]
async fn test_different_files_do_not_conflict() {
    let env = TestEnv::new();
    let first = env.engine().await;

    let other = env.config();
    let other = vusermgr::EngineConfig {
        credential_file: env.dir.path().join("passwd.other"),
        ..other
    };
    let second = env.engine_with(other).await;

    first.close().await.unwrap();
    second.close().await.unwrap();
}

#[tokio::test]
async fn test_custom_guard() {
    let env = TestEnv::new();

    let first = Engine::open_with_guard(env.config(), Box::new(InMemory::new()), Arc::new(NoGuard))
        .await
        .unwrap();
    let second = Engine::open_with_guard(env.config(), Box::new(InMemory::new()), Arc::new(NoGuard))
        .await
        .unwrap();

    first.close().await.unwrap();
    second.close().await.unwrap();
}
