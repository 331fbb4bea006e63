use std::sync::Arc;

use beat_core::{CounterField, CounterWriter, MediaCatalog, MediaRecord, MediaRecordId};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::progress::JobTable;
use crate::{
    BlobConfig, Bookkeeping, DefaultKeyStrategy, MediaCache, MediaKeyStrategy, MediaMetadata,
    MediaReceipt, ObjectStore, ProgressReporter, UploadError, UploadEvent, UploadId, UploadJob,
    UploadOutcome, UploadResult, UploadSource, UploadState, UploadTask,
};

/// Validates, names and runs media uploads, then performs the best-effort
/// follow-up writes (catalog record, profile counter, cache warm-up).
#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    keys: Arc<dyn MediaKeyStrategy>,
    counter: Option<Arc<dyn CounterWriter>>,
    catalog: Option<Arc<dyn MediaCatalog>>,
    cache: Option<MediaCache>,
    config: BlobConfig,
    jobs: JobTable,
}

/// Everything the background transfer needs, detached from the caller
struct PendingUpload {
    id: UploadId,
    owner: String,
    key: String,
    path: String,
    body: Bytes,
    content_type: String,
    metadata: MediaMetadata,
}

impl UploadCoordinator {
    /// Create a coordinator over an object store
    pub fn new<S: ObjectStore + 'static>(store: S, config: BlobConfig) -> Self {
        Self::from_arc(Arc::new(store), config)
    }

    pub fn from_arc(store: Arc<dyn ObjectStore>, config: BlobConfig) -> Self {
        Self {
            store,
            keys: Arc::new(DefaultKeyStrategy::new()),
            counter: None,
            catalog: None,
            cache: None,
            config,
            jobs: JobTable::default(),
        }
    }

    /// Use a custom key strategy
    pub fn with_key_strategy<K: MediaKeyStrategy + 'static>(mut self, keys: K) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    /// Bump the uploader's media counter after each successful upload
    pub fn with_counter(mut self, counter: Arc<dyn CounterWriter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Record each successful upload in a media catalog
    pub fn with_catalog(mut self, catalog: Arc<dyn MediaCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Warm a media cache with each uploaded file
    pub fn with_cache(mut self, cache: MediaCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Get configuration
    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Validate and start uploading `source` on behalf of `owner`.
    ///
    /// Validation failures are returned immediately, before any network
    /// activity. Everything after that is reported through the returned task.
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, source, metadata), fields(file = %source.file_name, size = source.size()))]
    pub fn submit(
        &self,
        owner: &str,
        source: UploadSource,
        metadata: MediaMetadata,
    ) -> UploadResult<UploadTask> {
        if let Err(error) = self.validate(owner, &source, &metadata) {
            warn!(%error, "Upload rejected");
            let mut job = UploadJob::new(source.file_name, String::new(), String::new(), source.bytes.len() as u64);
            job.transition(UploadState::Failed, Some(error.clone()));
            self.jobs.write().insert(job.id.clone(), job);
            self.prune_jobs();
            return Err(error);
        }

        let key = self.keys.destination_key(&source.file_name);
        let path = self.keys.object_path(owner, &key);
        let job = UploadJob::new(source.file_name.clone(), key.clone(), path.clone(), source.size());
        let id = job.id.clone();
        self.jobs.write().insert(id.clone(), job);
        debug!(upload_id = %id, %path, "Upload accepted");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(id.clone(), source.size(), events_tx, self.jobs.clone());
        let cancel = CancellationToken::new();

        let upload = PendingUpload {
            id: id.clone(),
            owner: owner.to_string(),
            key: key.clone(),
            path: path.clone(),
            content_type: source
                .content_type
                .clone()
                .unwrap_or_else(|| self.config.default_content_type.clone()),
            body: source.bytes,
            metadata,
        };

        let coordinator = self.clone();
        let token = cancel.clone();
        let outcome = tokio::spawn(async move { coordinator.run(upload, reporter, token).await });

        Ok(UploadTask::new(id, key, path, cancel, events_rx, outcome))
    }

    /// Look up a job by id
    pub fn job(&self, id: &UploadId) -> Option<UploadJob> {
        self.jobs.read().get(id).cloned()
    }

    /// Drop a finished job from the table. In-flight jobs are kept.
    pub fn forget(&self, id: &UploadId) -> Option<UploadJob> {
        let mut jobs = self.jobs.write();
        if !jobs.get(id)?.state.is_terminal() {
            return None;
        }
        jobs.remove(id)
    }

    /// Jobs still tracked by this coordinator, oldest first. Finished jobs
    /// beyond [`BlobConfig::job_retention`] are pruned oldest first.
    pub fn jobs(&self) -> Vec<UploadJob> {
        let mut jobs: Vec<UploadJob> = self.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    fn validate(&self, owner: &str, source: &UploadSource, metadata: &MediaMetadata) -> UploadResult<()> {
        if owner.trim().is_empty() {
            return Err(UploadError::validation("You must be logged in to upload media"));
        }

        let mut missing = metadata.missing_fields();
        if source.file_name.trim().is_empty() || source.bytes.is_empty() {
            missing.push("file");
        }
        if !missing.is_empty() {
            return Err(UploadError::validation(format!(
                "Please fill all fields and select a media file (missing: {})",
                missing.join(", ")
            )));
        }

        if source.size() > self.config.max_upload_bytes {
            return Err(UploadError::validation(format!(
                "File size exceeds {}MB. Please use a smaller file.",
                self.config.max_upload_bytes / (1024 * 1024)
            )));
        }

        Ok(())
    }

    #[instrument(skip_all, fields(upload_id = %upload.id))]
    async fn run(self, upload: PendingUpload, reporter: ProgressReporter, cancel: CancellationToken) -> UploadOutcome {
        self.set_state(&upload.id, UploadState::Uploading, None);
        info!(path = %upload.path, bytes = upload.body.len(), "Uploading media");

        let transfer = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.store.upload(
                &upload.path,
                upload.body.clone(),
                &upload.content_type,
                reporter.clone(),
                cancel.clone(),
            ) => Some(result),
        };

        let put = match transfer {
            None => return self.canceled(&upload, &reporter).await,
            Some(Err(error)) => {
                warn!(%error, "Object store rejected upload");
                let error = UploadError::from(error);
                if error == UploadError::Canceled || cancel.is_cancelled() {
                    return self.canceled(&upload, &reporter).await;
                }
                return self.failed(&upload, &reporter, error);
            }
            Some(Ok(put)) => put,
        };

        let total = upload.body.len() as u64;
        if put.size_bytes != total {
            warn!(expected = total, stored = put.size_bytes, "Stored object size mismatch");
            self.release_partial(&upload.path).await;
            return self.failed(&upload, &reporter, UploadError::SizeMismatch);
        }

        reporter.report(total);
        let mut receipt = MediaReceipt::new(&upload.path, &upload.key, put.url, put.size_bytes)
            .with_content_type(upload.content_type.clone());
        if let Some(etag) = put.etag {
            receipt = receipt.with_etag(etag);
        }

        self.set_state(&upload.id, UploadState::Succeeded, None);
        reporter.close_with(UploadEvent::Succeeded(receipt.clone()));
        info!(url = %receipt.url, "Media uploaded");

        let (record_id, bookkeeping) = self.bookkeeping(&upload, &receipt).await;
        UploadOutcome::Succeeded {
            receipt,
            record_id,
            bookkeeping,
        }
    }

    /// Catalog record, counter and cache warm-up. None of these undo the upload.
    async fn bookkeeping(&self, upload: &PendingUpload, receipt: &MediaReceipt) -> (Option<MediaRecordId>, Bookkeeping) {
        let mut failures = Vec::new();

        let record_id = match &self.catalog {
            Some(catalog) => {
                let record = MediaRecord {
                    owner: upload.owner.clone(),
                    title: upload.metadata.title.clone(),
                    bpm: upload.metadata.bpm,
                    key: upload.metadata.key.clone(),
                    genre: upload.metadata.genre.clone(),
                    upload_date: Utc::now(),
                    audio_url: receipt.url.clone(),
                    storage_key: receipt.path.clone(),
                    size_bytes: receipt.size_bytes,
                };
                match catalog.add(record).await {
                    Ok(id) => Some(id),
                    Err(error) => {
                        warn!(%error, "Media uploaded but catalog record not written");
                        failures.push(format!("catalog: {error}"));
                        None
                    }
                }
            }
            None => None,
        };

        if let Some(counter) = &self.counter {
            if let Err(error) = counter.write_counter(CounterField::MediaCount, 1).await {
                warn!(%error, "Media uploaded but profile counter not updated");
                failures.push(format!("counter: {error}"));
            }
        }

        if let Some(cache) = &self.cache {
            cache.prime(&receipt.url, upload.body.clone(), Some(upload.content_type.clone()));
        }

        let bookkeeping = if failures.is_empty() {
            Bookkeeping::Synchronized
        } else {
            Bookkeeping::Desynchronized { failures }
        };
        (record_id, bookkeeping)
    }

    async fn canceled(&self, upload: &PendingUpload, reporter: &ProgressReporter) -> UploadOutcome {
        self.set_state(&upload.id, UploadState::Canceled, Some(UploadError::Canceled));
        reporter.close_with(UploadEvent::Canceled);
        info!("Upload canceled");
        self.release_partial(&upload.path).await;
        UploadOutcome::Canceled
    }

    fn failed(&self, upload: &PendingUpload, reporter: &ProgressReporter, error: UploadError) -> UploadOutcome {
        self.set_state(&upload.id, UploadState::Failed, Some(error.clone()));
        reporter.close_with(UploadEvent::Failed(error.clone()));
        warn!(kind = error.kind(), "Upload failed: {}", error);
        UploadOutcome::Failed(error)
    }

    async fn release_partial(&self, path: &str) {
        if !self.store.capabilities().supports_abort {
            return;
        }
        if let Err(error) = self.store.abort(path).await {
            warn!(%error, path, "Could not release partial upload");
        }
    }

    fn set_state(&self, id: &UploadId, state: UploadState, error: Option<UploadError>) {
        let terminal = state.is_terminal();
        if let Some(job) = self.jobs.write().get_mut(id) {
            job.transition(state, error);
        }
        if terminal {
            self.prune_jobs();
        }
    }

    fn prune_jobs(&self) {
        let mut jobs = self.jobs.write();
        let mut finished: Vec<(DateTime<Utc>, UploadId)> = jobs
            .values()
            .filter(|job| job.state.is_terminal())
            .map(|job| (job.updated_at, job.id.clone()))
            .collect();
        if finished.len() <= self.config.job_retention {
            return;
        }

        finished.sort_by(|a, b| a.0.cmp(&b.0));
        let excess = finished.len() - self.config.job_retention;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
        debug!(pruned = excess, "Pruned finished upload jobs");
    }
}
