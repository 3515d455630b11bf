use std::sync::Arc;
use std::sync::Mutex;
use troupe::{MemoryStore, SetMode, Store, StoreError, CLAIM_SCRIPT};

#[tokio::test]
async fn test_list_push_pop_both_ends() {
    let store = MemoryStore::new();

    store.list_push_tail("l", b"a".to_vec()).await.unwrap();
    store.list_push_tail("l", b"b".to_vec()).await.unwrap();
    store.list_push_head("l", b"c".to_vec()).await.unwrap();
    assert_eq!(store.list_len("l").await.unwrap(), 3);

    // List is now [c, a, b]; pops come off the tail
    assert_eq!(store.list_pop_tail("l").await.unwrap(), Some(b"b".to_vec()));
    assert_eq!(store.list_pop_tail("l").await.unwrap(), Some(b"a".to_vec()));
    assert_eq!(store.list_pop_tail("l").await.unwrap(), Some(b"c".to_vec()));
    assert_eq!(store.list_pop_tail("l").await.unwrap(), None);
    assert_eq!(store.list_len("l").await.unwrap(), 0);
}

#[tokio::test]
async fn test_pop_from_missing_list() {
    let store = MemoryStore::new();
    assert_eq!(store.list_pop_tail("missing").await.unwrap(), None);
    assert_eq!(store.list_len("missing").await.unwrap(), 0);
}

#[tokio::test]
async fn test_hash_set_modes() {
    let store = MemoryStore::new();

    let wrote = store
        .hash_set("h", "f", b"one".to_vec(), SetMode::IfAbsent)
        .await
        .unwrap();
    assert!(wrote);

    let wrote = store
        .hash_set("h", "f", b"two".to_vec(), SetMode::IfAbsent)
        .await
        .unwrap();
    assert!(!wrote, "if-absent must not replace an existing field");
    assert_eq!(store.hash_get("h", "f").await.unwrap(), Some(b"one".to_vec()));

    let wrote = store
        .hash_set("h", "f", b"two".to_vec(), SetMode::Overwrite)
        .await
        .unwrap();
    assert!(wrote);
    assert_eq!(store.hash_get("h", "f").await.unwrap(), Some(b"two".to_vec()));
}

#[tokio::test]
async fn test_hash_delete_and_entries() {
    let store = MemoryStore::new();

    store
        .hash_set("h", "a", b"1".to_vec(), SetMode::Overwrite)
        .await
        .unwrap();
    store
        .hash_set("h", "b", b"2".to_vec(), SetMode::Overwrite)
        .await
        .unwrap();

    let mut entries = store.hash_entries("h").await.unwrap();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            ("a".to_string(), b"1".to_vec()),
            ("b".to_string(), b"2".to_vec())
        ]
    );

    assert!(store.hash_delete("h", "a").await.unwrap());
    assert!(!store.hash_delete("h", "a").await.unwrap());
    assert_eq!(store.hash_get("h", "a").await.unwrap(), None);
    assert_eq!(store.hash_entries("missing").await.unwrap(), vec![]);
}

#[tokio::test]
async fn test_claim_script_moves_value() {
    let store = MemoryStore::new();
    store.list_push_head("inbox", b"payload".to_vec()).await.unwrap();

    let claimed = store
        .eval(CLAIM_SCRIPT, &["inbox", "pipeline"], &[b"pid1"])
        .await
        .unwrap();
    assert_eq!(claimed, Some(b"payload".to_vec()));

    // Value left the inbox and landed in the pipeline hash atomically
    assert_eq!(store.list_len("inbox").await.unwrap(), 0);
    assert_eq!(
        store.hash_get("pipeline", "pid1").await.unwrap(),
        Some(b"payload".to_vec())
    );
}

#[tokio::test]
async fn test_claim_script_on_empty_inbox() {
    let store = MemoryStore::new();
    let claimed = store
        .eval(CLAIM_SCRIPT, &["inbox", "pipeline"], &[b"pid1"])
        .await
        .unwrap();
    assert_eq!(claimed, None);
    assert_eq!(store.hash_entries("pipeline").await.unwrap(), vec![]);
}

#[tokio::test]
async fn test_unknown_script_rejected() {
    let store = MemoryStore::new();
    let result = store.eval("return 1", &[], &[]).await;
    assert!(matches!(result, Err(StoreError::UnsupportedScript)));
}

#[tokio::test]
async fn test_publish_reaches_subscribers() {
    let store = MemoryStore::new();
    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let subscription = store
        .subscribe(
            "chan",
            Box::new(move |payload| sink.lock().unwrap().push(payload.to_vec())),
        )
        .await
        .unwrap();

    store.publish("chan", b"one").await.unwrap();
    store.publish("other", b"elsewhere").await.unwrap();
    store.publish("chan", b"two").await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![b"one".to_vec(), b"two".to_vec()]
    );

    drop(subscription);
    store.publish("chan", b"three").await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2, "dropped subscription must not fire");
}
