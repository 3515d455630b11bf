use std::sync::Arc;
use troupe::{Envelope, ErrorEnvelope, Mailbox, MemoryStore, Priority, Store};

fn mailbox(store: &Arc<MemoryStore>) -> Mailbox {
    let store: Arc<dyn Store> = Arc::clone(store) as Arc<dyn Store>;
    Mailbox::new("worker", store)
}

#[tokio::test]
async fn test_claim_moves_envelope_to_pipeline() {
    let store = MemoryStore::new();
    let mailbox = mailbox(&store);
    let keys = mailbox.keys().clone();

    let envelope = Envelope::fire_and_forget(7u32);
    mailbox.post(&envelope, Priority::Normal).await.unwrap();
    assert_eq!(mailbox.queue_len().await.unwrap(), 1);

    let (pipeline_id, bytes) = mailbox.claim().await.unwrap().expect("one envelope waiting");
    let claimed: Envelope<u32> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(claimed, envelope);

    // Gone from the inbox, present in the pipeline until committed
    assert_eq!(mailbox.queue_len().await.unwrap(), 0);
    assert_eq!(
        store
            .hash_get(&keys.pipeline, pipeline_id.as_str())
            .await
            .unwrap(),
        Some(bytes)
    );

    mailbox.commit(&pipeline_id).await.unwrap();
    assert_eq!(store.hash_entries(&keys.pipeline).await.unwrap(), vec![]);
}

#[tokio::test]
async fn test_claim_on_empty_inbox() {
    let store = MemoryStore::new();
    let mailbox = mailbox(&store);
    assert!(mailbox.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn test_normal_posts_claim_fifo() {
    let store = MemoryStore::new();
    let mailbox = mailbox(&store);

    for n in 1u32..=3 {
        mailbox
            .post(&Envelope::fire_and_forget(n), Priority::Normal)
            .await
            .unwrap();
    }

    for expected in 1u32..=3 {
        let (_, bytes) = mailbox.claim().await.unwrap().unwrap();
        let envelope: Envelope<u32> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.payload, expected);
    }
}

#[tokio::test]
async fn test_high_priority_jumps_the_queue() {
    let store = MemoryStore::new();
    let mailbox = mailbox(&store);

    mailbox
        .post(&Envelope::fire_and_forget("n1"), Priority::Normal)
        .await
        .unwrap();
    mailbox
        .post(&Envelope::fire_and_forget("h1"), Priority::High)
        .await
        .unwrap();
    mailbox
        .post(&Envelope::fire_and_forget("h2"), Priority::High)
        .await
        .unwrap();

    // High-priority posts first, newest high first, then normal FIFO
    let mut order = Vec::new();
    while let Some((_, bytes)) = mailbox.claim().await.unwrap() {
        let envelope: Envelope<String> = serde_json::from_slice(&bytes).unwrap();
        order.push(envelope.payload);
    }
    assert_eq!(order, vec!["h2", "h1", "n1"]);
}

#[tokio::test]
async fn test_pending_lists_uncommitted_entries() {
    let store = MemoryStore::new();
    let mailbox = mailbox(&store);

    mailbox
        .post(&Envelope::fire_and_forget(1u32), Priority::Normal)
        .await
        .unwrap();
    mailbox
        .post(&Envelope::fire_and_forget(2u32), Priority::Normal)
        .await
        .unwrap();

    let (first, _) = mailbox.claim().await.unwrap().unwrap();
    let (_second, _) = mailbox.claim().await.unwrap().unwrap();
    assert_eq!(mailbox.pending().await.unwrap().len(), 2);

    mailbox.commit(&first).await.unwrap();
    let pending = mailbox.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_ne!(pending[0].0, first);
}

#[tokio::test]
async fn test_result_read_consumes_when_asked() {
    let store = MemoryStore::new();
    let mailbox = mailbox(&store);

    mailbox.write_result("cid1", b"42".to_vec()).await.unwrap();
    assert_eq!(
        mailbox.read_result("cid1", false).await.unwrap(),
        Some(b"42".to_vec())
    );
    assert_eq!(
        mailbox.read_result("cid1", true).await.unwrap(),
        Some(b"42".to_vec()),
        "retained result must still be readable"
    );
    assert_eq!(mailbox.read_result("cid1", true).await.unwrap(), None);
}

#[tokio::test]
async fn test_result_write_publishes_correlation_id() {
    let store = MemoryStore::new();
    let mailbox = mailbox(&store);
    let keys = mailbox.keys().clone();

    let seen: Arc<std::sync::Mutex<Vec<Vec<u8>>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = store
        .subscribe(
            &keys.channel,
            Box::new(move |payload| sink.lock().unwrap().push(payload.to_vec())),
        )
        .await
        .unwrap();

    mailbox.write_result("cid1", b"42".to_vec()).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![b"cid1".to_vec()]);
}

#[tokio::test]
async fn test_post_publishes_empty_notification() {
    let store = MemoryStore::new();
    let mailbox = mailbox(&store);
    let keys = mailbox.keys().clone();

    let seen: Arc<std::sync::Mutex<Vec<Vec<u8>>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = store
        .subscribe(
            &keys.channel,
            Box::new(move |payload| sink.lock().unwrap().push(payload.to_vec())),
        )
        .await
        .unwrap();

    mailbox
        .post(&Envelope::fire_and_forget(1u32), Priority::Normal)
        .await
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![Vec::<u8>::new()]);
}

#[tokio::test]
async fn test_errors_append_in_order() {
    let store = MemoryStore::new();
    let mailbox = mailbox(&store);
    let keys = mailbox.keys().clone();

    let first = ErrorEnvelope::new("worker", serde_json::json!("in1"), "boom");
    let second = ErrorEnvelope::new("worker", serde_json::json!("in2"), "bang");
    mailbox.record_error(&first).await.unwrap();
    mailbox.record_error(&second).await.unwrap();

    assert_eq!(store.list_len(&keys.errors).await.unwrap(), 2);
    let newest = store.list_pop_tail(&keys.errors).await.unwrap().unwrap();
    let envelope: ErrorEnvelope = serde_json::from_slice(&newest).unwrap();
    assert_eq!(envelope, second);
}
