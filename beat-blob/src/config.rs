use beat_core::BeatConfigSnapshot;

use crate::FetchMode;

/// Configuration for uploads and media retrieval
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Absolute max size accepted for a single media file
    pub max_upload_bytes: u64,

    /// Used when the source carries no content type
    pub default_content_type: String,

    /// Request mode for media fetches
    pub fetch_mode: FetchMode,

    /// Unreferenced ready entries the media cache keeps for reuse
    pub max_warm_entries: usize,

    /// Byte budget shared by those unreferenced entries
    pub max_warm_bytes: u64,

    /// Terminal upload jobs kept for inspection; older ones are pruned
    pub job_retention: usize,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 50 * 1024 * 1024, // 50MB
            default_content_type: "application/octet-stream".to_string(),
            fetch_mode: FetchMode::Cors,
            max_warm_entries: 8,
            max_warm_bytes: 64 * 1024 * 1024,
            job_retention: 64,
        }
    }
}

impl BlobConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `upload.*` and `cache.*` keys, keeping defaults for anything missing
    pub fn from_snapshot(snapshot: &BeatConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            max_upload_bytes: snapshot
                .get_u64("upload.max_bytes")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_upload_bytes),
            default_content_type: snapshot
                .get_string("upload.default_content_type")
                .unwrap_or(defaults.default_content_type),
            fetch_mode: defaults.fetch_mode,
            max_warm_entries: snapshot
                .get_u64("cache.max_warm_entries")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_warm_entries),
            max_warm_bytes: snapshot
                .get_u64("cache.max_warm_bytes")
                .unwrap_or(defaults.max_warm_bytes),
            job_retention: snapshot
                .get_u64("upload.job_retention")
                .map(|n| n as usize)
                .unwrap_or(defaults.job_retention),
        }
    }

    /// Set max upload size
    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_default_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    /// Bound the unreferenced entries the media cache keeps warm
    pub fn with_warm_limits(mut self, max_entries: usize, max_bytes: u64) -> Self {
        self.max_warm_entries = max_entries;
        self.max_warm_bytes = max_bytes;
        self
    }

    pub fn with_job_retention(mut self, jobs: usize) -> Self {
        self.job_retention = jobs;
        self
    }
}
