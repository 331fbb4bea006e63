use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::{FetchError, FetchMode, ObjectStoreError, ProgressReporter};

/// Resumable object storage for uploaded media
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Transfer `body` to `path`, reporting bytes sent through `progress`.
    ///
    /// Implementations should stop promptly once `cancel` fires.
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<PutResult, ObjectStoreError>;

    /// Release a partially written object
    async fn abort(&self, path: &str) -> Result<(), ObjectStoreError>;

    /// Get store capabilities
    fn capabilities(&self) -> StoreCapabilities;
}

/// Retrieval of remote media bytes
#[async_trait]
pub trait CrossOriginFetch: Send + Sync {
    async fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchedMedia, FetchError>;
}

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct PutResult {
    pub url: String,
    pub size_bytes: u64,
    pub etag: Option<String>,
}

/// Bytes returned by a media fetch
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Store capabilities
#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    pub supports_abort: bool,
    pub supports_resume: bool,
}

impl StoreCapabilities {
    pub fn basic() -> Self {
        Self {
            supports_abort: false,
            supports_resume: false,
        }
    }

    pub fn with_abort(mut self) -> Self {
        self.supports_abort = true;
        self
    }

    pub fn with_resume(mut self) -> Self {
        self.supports_resume = true;
        self
    }
}

/// Strategy for naming uploaded objects
pub trait MediaKeyStrategy: Send + Sync {
    /// Unique, storage-safe file name derived from the user's file name
    fn destination_key(&self, file_name: &str) -> String;

    /// Full object path for an owner's media file
    fn object_path(&self, owner: &str, key: &str) -> String;
}

/// Default key strategy: `users/{owner}/media/{token}_{sanitized name}`
#[derive(Debug, Default)]
pub struct DefaultKeyStrategy {
    last_token: AtomicI64,
}

impl DefaultKeyStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Millisecond timestamp, bumped so two calls never share a token
    fn next_token(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last_token.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_token
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

impl MediaKeyStrategy for DefaultKeyStrategy {
    fn destination_key(&self, file_name: &str) -> String {
        format!("{}_{}", self.next_token(), sanitize_file_name(file_name))
    }

    fn object_path(&self, owner: &str, key: &str) -> String {
        format!("users/{}/media/{}", owner, key)
    }
}

/// Replace whitespace runs with `_` and drop anything outside `[A-Za-z0-9_.-]`
pub fn sanitize_file_name(name: &str) -> String {
    let mut clean = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                clean.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            clean.push(c);
        }
    }
    clean
}
