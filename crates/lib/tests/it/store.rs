//! Behaviour every store in the TEST_BACKEND matrix must share.

use vusermgr::store::UserRecord;

use crate::helpers::*;

fn sorted(mut records: Vec<UserRecord>) -> Vec<UserRecord> {
    records.sort_by(|a, b| a.username.cmp(&b.username));
    records
}

#[tokio::test]
async fn test_upsert_list_delete() {
    let store = test_store().await;
    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap();

    store.upsert("alice", "$1$aaaaaaaa$one").await.unwrap();
    store.upsert("bobby", "$1$bbbbbbbb$two").await.unwrap();
    store.upsert("alice", "$1$cccccccc$three").await.unwrap();

    assert_eq!(
        sorted(store.list_all().await.unwrap()),
        vec![
            UserRecord::new("alice", "$1$cccccccc$three"),
            UserRecord::new("bobby", "$1$bbbbbbbb$two"),
        ]
    );

    store.delete("alice").await.unwrap();
    store.delete("alice").await.unwrap();
    assert_eq!(
        store.list_all().await.unwrap(),
        vec![UserRecord::new("bobby", "$1$bbbbbbbb$two")]
    );

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_store_lists_nothing() {
    let store = test_store().await;
    store.ensure_schema().await.unwrap();
    assert!(store.list_all().await.unwrap().is_empty());
}
