use beat_core::memory::{MemoryConnectivity, MemoryDocumentStore, MemoryIdentitySource};
use beat_core::{
    Connectivity, ConnectivitySource, CounterField, DocumentStore, Identity, IdentitySource,
    ProfileDocument, StoreError,
};
use futures::StreamExt;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_scripted_failures_are_consumed_in_order() {
    let store = MemoryDocumentStore::new();
    store.insert("u1", ProfileDocument::default());
    store.fail_next_get(StoreError::unavailable("offline"));
    store.fail_next_get(StoreError::permission_denied("rules"));

    assert!(store.get("u1").await.unwrap_err().is_transient());
    assert!(matches!(
        store.get("u1").await,
        Err(StoreError::PermissionDenied { .. })
    ));
    assert_ok!(store.get("u1").await);
    assert_eq!(store.get_calls(), 3);
}

#[tokio::test]
async fn test_increment_requires_existing_document() {
    let store = MemoryDocumentStore::new();
    let missing = store.increment("ghost", CounterField::MediaCount, 1).await;
    assert!(missing.unwrap_err().is_not_found());

    store.insert("u1", ProfileDocument::default());
    assert_ok!(store.increment("u1", CounterField::MediaCount, 2).await);
    assert_ok!(store.increment("u1", CounterField::MediaCount, 1).await);
    assert_eq!(store.document("u1").unwrap().beats_count, Some(3));
}

#[tokio::test]
async fn test_offline_store_rejects_every_operation() {
    let store = MemoryDocumentStore::new();
    store.set_offline(true);
    assert_err!(store.create("u1", ProfileDocument::default()).await);
    store.set_offline(false);
    assert_ok!(store.create("u1", ProfileDocument::default()).await);
}

#[tokio::test]
async fn test_identity_changes_reach_subscribers() {
    let source = MemoryIdentitySource::new();
    let mut rx = source.subscribe();
    assert!(rx.borrow().is_none());

    source.sign_in(Identity::new("u1"));
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().as_ref().map(|i| i.uid.clone()), Some("u1".to_string()));
}

#[tokio::test]
async fn test_connectivity_events_are_streamed() {
    let source = MemoryConnectivity::new();
    let mut events = source.subscribe();
    source.emit(Connectivity::Offline);
    source.emit(Connectivity::Online);

    assert_eq!(events.next().await, Some(Connectivity::Offline));
    assert_eq!(events.next().await, Some(Connectivity::Online));
}
