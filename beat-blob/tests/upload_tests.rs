use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beat_blob::memory::{MemoryFetcher, MemoryObjectStore};
use beat_blob::{
    BlobConfig, Bookkeeping, MediaCache, MediaMetadata, ObjectStoreError, UploadCoordinator,
    UploadError, UploadEvent, UploadOutcome, UploadSource, UploadState,
};
use beat_core::memory::MemoryMediaCatalog;
use beat_core::{CounterError, CounterField, CounterWriter, MediaCatalog, StoreError};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio_test::assert_ok;

const TWO_MB: usize = 2 * 1024 * 1024;

/// Counter capability that records calls and optionally fails
#[derive(Default)]
struct RecordingCounter {
    calls: Mutex<Vec<(CounterField, i64)>>,
    failure: Option<CounterError>,
}

impl RecordingCounter {
    fn failing(error: CounterError) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failure: Some(error),
        }
    }

    fn calls(&self) -> Vec<(CounterField, i64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CounterWriter for RecordingCounter {
    async fn write_counter(&self, field: CounterField, delta: i64) -> Result<(), CounterError> {
        self.calls.lock().push((field, delta));
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn beat_source(size: usize) -> UploadSource {
    UploadSource::new("My Beat!! (final).mp3", vec![7u8; size]).with_content_type("audio/mpeg")
}

fn beat_metadata() -> MediaMetadata {
    MediaMetadata::new("Night Drive", 92, "A minor", "Lo-fi")
}

#[tokio::test]
async fn test_upload_succeeds_even_when_counter_write_is_denied() {
    let store = MemoryObjectStore::new().with_chunk_size(256 * 1024);
    let catalog = MemoryMediaCatalog::new();
    let counter = Arc::new(RecordingCounter::failing(CounterError::Store(
        StoreError::permission_denied("Missing or insufficient permissions"),
    )));
    let uploads = UploadCoordinator::new(store.clone(), BlobConfig::default())
        .with_counter(counter.clone())
        .with_catalog(Arc::new(catalog.clone()));

    let mut task = assert_ok!(uploads.submit("u1", beat_source(TWO_MB), beat_metadata()));
    let id = task.id().clone();
    let events = task.events();
    let outcome = task.wait().await;
    let events: Vec<UploadEvent> = events.collect().await;

    let (receipt, record_id, bookkeeping) = match outcome {
        UploadOutcome::Succeeded { receipt, record_id, bookkeeping } => (receipt, record_id, bookkeeping),
        other => panic!("expected success, got {other:?}"),
    };
    assert_eq!(receipt.size_bytes, TWO_MB as u64);
    assert!(matches!(bookkeeping, Bookkeeping::Desynchronized { ref failures } if failures.len() == 1));
    assert_eq!(counter.calls(), vec![(CounterField::MediaCount, 1)]);
    assert!(record_id.is_some());
    assert_eq!(catalog.len(), 1);
    assert!(store.object(&receipt.path).is_some());

    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            UploadEvent::Progress(p) => Some(p.bytes_sent),
            _ => None,
        })
        .collect();
    assert!(progress.windows(2).all(|w| w[0] < w[1]), "progress went backwards: {progress:?}");
    assert_eq!(progress.last(), Some(&(TWO_MB as u64)));
    assert!(matches!(events.last(), Some(UploadEvent::Succeeded(_))));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let job = uploads.job(&id).unwrap();
    assert_eq!(job.state, UploadState::Succeeded);
    assert!(job.progress.is_complete());
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_catalog_record_describes_the_upload() {
    let catalog = MemoryMediaCatalog::new();
    let counter = Arc::new(RecordingCounter::default());
    let uploads = UploadCoordinator::new(MemoryObjectStore::new(), BlobConfig::default())
        .with_counter(counter.clone())
        .with_catalog(Arc::new(catalog.clone()));

    let task = assert_ok!(uploads.submit("u1", beat_source(4096), beat_metadata()));
    let outcome = task.wait().await;
    assert!(matches!(
        outcome,
        UploadOutcome::Succeeded { bookkeeping: Bookkeeping::Synchronized, .. }
    ));

    let records = assert_ok!(catalog.list_for_owner("u1").await);
    assert_eq!(records.len(), 1);
    let (_, record) = &records[0];
    assert_eq!(record.title, "Night Drive");
    assert_eq!(record.bpm, 92);
    assert_eq!(record.audio_url, outcome.receipt().unwrap().url);
    assert!(record.storage_key.starts_with("users/u1/media/"));
}

#[tokio::test]
async fn test_destination_key_is_sanitized_and_token_prefixed() {
    let uploads = UploadCoordinator::new(MemoryObjectStore::new(), BlobConfig::default());

    let first = assert_ok!(uploads.submit("u1", beat_source(10), beat_metadata()));
    let second = assert_ok!(uploads.submit("u1", beat_source(10), beat_metadata()));

    let (token, name) = first.key().split_once('_').unwrap();
    assert!(!token.is_empty() && token.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(name, "My_Beat_final.mp3");
    assert!(first
        .key()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')));
    assert_eq!(first.path(), format!("users/u1/media/{}", first.key()));
    assert_ne!(first.key(), second.key());
}

#[tokio::test]
async fn test_oversized_file_is_rejected_before_any_transfer() {
    let store = MemoryObjectStore::new();
    let uploads = UploadCoordinator::new(store.clone(), BlobConfig::default().with_max_upload_bytes(1024));

    let result = uploads.submit("u1", beat_source(2048), beat_metadata());

    let error = result.err().unwrap();
    assert!(error.is_validation());
    assert!(error.user_message().contains("exceeds"));
    assert_eq!(store.upload_calls(), 0);
    let jobs = uploads.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, UploadState::Failed);
}

#[tokio::test]
async fn test_missing_metadata_and_signed_out_owner_are_rejected() {
    let store = MemoryObjectStore::new();
    let uploads = UploadCoordinator::new(store.clone(), BlobConfig::default());

    let no_title = MediaMetadata { title: "  ".into(), ..beat_metadata() };
    let error = uploads.submit("u1", beat_source(10), no_title).err().unwrap();
    assert!(error.user_message().contains("title"));

    let empty_file = UploadSource::new("empty.mp3", Vec::<u8>::new());
    assert!(uploads.submit("u1", empty_file, beat_metadata()).err().unwrap().is_validation());

    let error = uploads.submit("", beat_source(10), beat_metadata()).err().unwrap();
    assert_eq!(error, UploadError::validation("You must be logged in to upload media"));

    assert_eq!(store.upload_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_transfer_stops_progress_and_releases_partial_object() {
    let store = MemoryObjectStore::new()
        .with_chunk_size(256 * 1024)
        .with_chunk_delay(Duration::from_millis(100));
    let counter = Arc::new(RecordingCounter::default());
    let uploads = UploadCoordinator::new(store.clone(), BlobConfig::default()).with_counter(counter.clone());

    let mut task = assert_ok!(uploads.submit("u1", beat_source(TWO_MB), beat_metadata()));
    let id = task.id().clone();
    let events = task.events();

    tokio::time::sleep(Duration::from_millis(250)).await;
    task.cancel();
    task.cancel();
    let outcome = task.wait().await;
    let events: Vec<UploadEvent> = events.collect().await;

    assert!(outcome.is_canceled());
    assert!(matches!(events.last(), Some(UploadEvent::Canceled)));
    assert!(!events.iter().any(|e| matches!(e, UploadEvent::Succeeded(_))));

    let job = uploads.job(&id).unwrap();
    assert_eq!(job.state, UploadState::Canceled);
    assert_eq!(job.error, Some(UploadError::Canceled));
    assert!(job.progress.bytes_sent < job.progress.bytes_total);

    assert_eq!(store.abort_calls(), 1);
    assert!(store.partial_paths().is_empty());
    assert_eq!(store.object_count(), 0);
    assert!(counter.calls().is_empty());

    // Nothing trickles in afterwards
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(uploads.job(&id).unwrap().state, UploadState::Canceled);
}

#[tokio::test]
async fn test_transport_failures_are_classified() {
    let cases = [
        (ObjectStoreError::new(ObjectStoreError::UNAUTHORIZED, "denied"), UploadError::Unauthorized),
        (
            ObjectStoreError::new(ObjectStoreError::RETRY_LIMIT_EXCEEDED, "max retry time exceeded"),
            UploadError::RetryLimitExceeded,
        ),
        (ObjectStoreError::abort("The operation was aborted"), UploadError::Aborted),
    ];

    for (injected, expected) in cases {
        let store = MemoryObjectStore::new().with_chunk_size(1024);
        store.fail_next_upload(injected);
        let counter = Arc::new(RecordingCounter::default());
        let uploads = UploadCoordinator::new(store.clone(), BlobConfig::default()).with_counter(counter.clone());

        let mut task = assert_ok!(uploads.submit("u1", beat_source(8192), beat_metadata()));
        let id = task.id().clone();
        let events = task.events();
        let outcome = task.wait().await;
        let events: Vec<UploadEvent> = events.collect().await;

        assert_eq!(outcome.error(), Some(&expected));
        assert!(matches!(events.last(), Some(UploadEvent::Failed(e)) if *e == expected));
        assert_eq!(uploads.job(&id).unwrap().state, UploadState::Failed);
        assert!(counter.calls().is_empty());
    }
}

#[tokio::test]
async fn test_server_error_keeps_backend_detail() {
    let store = MemoryObjectStore::new();
    store.fail_next_upload(ObjectStoreError::http(500));
    let uploads = UploadCoordinator::new(store, BlobConfig::default());

    let task = assert_ok!(uploads.submit("u1", beat_source(100), beat_metadata()));
    let outcome = task.wait().await;

    let error = outcome.error().unwrap();
    assert_eq!(error.kind(), "server_error");
    assert!(error.user_message().starts_with("Server error (500)"));
    assert!(matches!(error, UploadError::ServerError { detail } if detail.contains("500")));
}

#[tokio::test]
async fn test_size_mismatch_fails_and_removes_object() {
    let store = MemoryObjectStore::new();
    store.misreport_next_size(99);
    let uploads = UploadCoordinator::new(store.clone(), BlobConfig::default());

    let task = assert_ok!(uploads.submit("u1", beat_source(100), beat_metadata()));
    let outcome = task.wait().await;

    assert_eq!(outcome.error(), Some(&UploadError::SizeMismatch));
    assert_eq!(store.abort_calls(), 1);
    assert_eq!(store.object_count(), 0);
}

#[tokio::test]
async fn test_successful_upload_primes_the_media_cache() {
    let fetcher = MemoryFetcher::new();
    let cache = MediaCache::new(Arc::new(fetcher.clone()));
    let uploads = UploadCoordinator::new(MemoryObjectStore::new(), BlobConfig::default()).with_cache(cache.clone());

    let task = assert_ok!(uploads.submit("u1", beat_source(512), beat_metadata()));
    let outcome = task.wait().await;
    let receipt = outcome.receipt().unwrap();

    let handle = assert_ok!(cache.acquire(&receipt.url).await);
    assert_eq!(handle.size_bytes(), 512);
    assert_eq!(handle.content_type(), Some("audio/mpeg"));
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_finished_jobs_are_pruned_past_retention() {
    let store = MemoryObjectStore::new();
    let uploads = UploadCoordinator::new(
        store.clone(),
        BlobConfig::default().with_max_upload_bytes(1024).with_job_retention(3),
    );

    for _ in 0..20 {
        assert!(uploads.submit("u1", beat_source(2048), beat_metadata()).is_err());
    }
    let jobs = uploads.jobs();
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|job| job.state == UploadState::Failed));

    let task = assert_ok!(uploads.submit("u1", beat_source(512), beat_metadata()));
    let id = task.id().clone();
    assert!(task.wait().await.receipt().is_some());

    let jobs = uploads.jobs();
    assert_eq!(jobs.len(), 3);
    assert_eq!(uploads.job(&id).map(|job| job.state), Some(UploadState::Succeeded));
    assert_eq!(store.upload_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_forget_only_drops_finished_jobs() {
    let store = MemoryObjectStore::new()
        .with_chunk_size(64 * 1024)
        .with_chunk_delay(Duration::from_millis(10));
    let uploads = UploadCoordinator::new(store, BlobConfig::default());

    let task = assert_ok!(uploads.submit("u1", beat_source(TWO_MB), beat_metadata()));
    let id = task.id().clone();
    assert!(uploads.forget(&id).is_none());
    assert!(uploads.job(&id).is_some());

    assert!(task.wait().await.receipt().is_some());
    let forgotten = uploads.forget(&id).expect("finished job should be forgotten");
    assert_eq!(forgotten.state, UploadState::Succeeded);
    assert!(uploads.job(&id).is_none());
    assert!(uploads.jobs().is_empty());
}
