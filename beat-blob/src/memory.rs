//! In-memory object store and media fetcher for tests and development.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::{
    CrossOriginFetch, FetchError, FetchMode, FetchedMedia, ObjectStore, ObjectStoreError,
    ProgressReporter, PutResult, StoreCapabilities,
};

/// A stored object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Object store that transfers in fixed-size chunks
#[derive(Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    partial: Arc<Mutex<HashSet<String>>>,
    faults: Arc<Mutex<VecDeque<ObjectStoreError>>>,
    misreported_size: Arc<Mutex<Option<u64>>>,
    chunk_size: usize,
    chunk_delay: Duration,
    upload_calls: Arc<AtomicUsize>,
    abort_calls: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::default(),
            partial: Arc::default(),
            faults: Arc::default(),
            misreported_size: Arc::default(),
            chunk_size: 256 * 1024,
            chunk_delay: Duration::ZERO,
            upload_calls: Arc::default(),
            abort_calls: Arc::default(),
        }
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    /// Simulated transfer time per chunk
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Fail the next upload after its first chunk
    pub fn fail_next_upload(&self, error: ObjectStoreError) {
        self.faults.lock().push_back(error);
    }

    /// Report this size for the next completed upload
    pub fn misreport_next_size(&self, size: u64) {
        *self.misreported_size.lock() = Some(size);
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.read().get(path).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Paths with a partially transferred object
    pub fn partial_paths(&self) -> Vec<String> {
        self.partial.lock().iter().cloned().collect()
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<PutResult, ObjectStoreError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.partial.lock().insert(path.to_string());

        let total = body.len();
        let mut sent = 0;
        while sent < total {
            if cancel.is_cancelled() {
                return Err(ObjectStoreError::new(ObjectStoreError::CANCELED, "User canceled the upload"));
            }
            if self.chunk_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.chunk_delay).await;
            }

            sent = (sent + self.chunk_size).min(total);
            progress.report(sent as u64);

            if let Some(error) = self.faults.lock().pop_front() {
                debug!(path, %error, "Injected upload failure");
                return Err(error);
            }
        }

        self.partial.lock().remove(path);
        self.objects.write().insert(
            path.to_string(),
            StoredObject {
                bytes: body,
                content_type: content_type.to_string(),
            },
        );

        let size_bytes = self.misreported_size.lock().take().unwrap_or(total as u64);
        Ok(PutResult {
            url: format!("memory://{}", path),
            size_bytes,
            etag: Some(Uuid::new_v4().simple().to_string()),
        })
    }

    async fn abort(&self, path: &str) -> Result<(), ObjectStoreError> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        self.partial.lock().remove(path);
        self.objects.write().remove(path);
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic().with_abort().with_resume()
    }
}

/// Media origin serving registered bytes
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    media: Arc<RwLock<HashMap<String, FetchedMedia>>>,
    no_cors: Arc<RwLock<HashSet<String>>>,
    faults: Arc<Mutex<VecDeque<FetchError>>>,
    offline: Arc<Mutex<bool>>,
    delay: Duration,
    calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated response time
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn insert<S, B>(&self, url: S, bytes: B, content_type: Option<&str>)
    where
        S: Into<String>,
        B: Into<Bytes>,
    {
        self.media.write().insert(
            url.into(),
            FetchedMedia {
                bytes: bytes.into(),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    /// Origin answers without cross-origin headers for `url`
    pub fn deny_cross_origin<S: Into<String>>(&self, url: S) {
        self.no_cors.write().insert(url.into());
    }

    pub fn allow_cross_origin(&self, url: &str) {
        self.no_cors.write().remove(url);
    }

    pub fn fail_next(&self, error: FetchError) {
        self.faults.lock().push_back(error);
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl CrossOriginFetch for MemoryFetcher {
    async fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchedMedia, FetchError> {
        *self.calls.lock().entry(url.to_string()).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(error) = self.faults.lock().pop_front() {
            return Err(error);
        }
        if *self.offline.lock() {
            return Err(FetchError::network("Failed to fetch"));
        }
        if mode == FetchMode::Cors && self.no_cors.read().contains(url) {
            return Err(FetchError::CrossOrigin { url: url.to_string() });
        }
        self.media
            .read()
            .get(url)
            .cloned()
            .ok_or(FetchError::Status { status: 404 })
    }
}
