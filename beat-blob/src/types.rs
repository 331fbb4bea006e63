use beat_core::MediaRecordId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MediaReceipt, UploadError};

/// Unique identifier for an upload job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(pub String);

impl UploadId {
    /// Generate a new random upload ID
    pub fn new() -> Self {
        Self(format!("upl_{}", Uuid::new_v4().simple()))
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How media bytes are requested from their origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMode {
    /// Cross-origin request; the origin must allow it
    #[default]
    Cors,
    SameOrigin,
}

/// Descriptive fields every upload must carry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub bpm: u32,
    /// Musical key, e.g. "C minor"
    pub key: String,
    pub genre: String,
}

impl MediaMetadata {
    pub fn new<T, K, G>(title: T, bpm: u32, key: K, genre: G) -> Self
    where
        T: Into<String>,
        K: Into<String>,
        G: Into<String>,
    {
        Self {
            title: title.into(),
            bpm,
            key: key.into(),
            genre: genre.into(),
        }
    }

    /// Names of required fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.bpm == 0 {
            missing.push("bpm");
        }
        if self.key.trim().is_empty() {
            missing.push("key");
        }
        if self.genre.trim().is_empty() {
            missing.push("genre");
        }
        missing
    }
}

/// A local file selected for upload
#[derive(Debug, Clone)]
pub struct UploadSource {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadSource {
    pub fn new<S, B>(file_name: S, bytes: B) -> Self
    where
        S: Into<String>,
        B: Into<Bytes>,
    {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Lifecycle of an upload job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    Validating,
    Uploading,
    Succeeded,
    Failed,
    Canceled,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// Bytes transferred so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub bytes_total: u64,
}

impl UploadProgress {
    pub fn new(bytes_sent: u64, bytes_total: u64) -> Self {
        Self {
            bytes_sent,
            bytes_total,
        }
    }

    /// Completion in percent, 0.0 to 100.0
    pub fn percent(&self) -> f64 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        self.bytes_sent as f64 / self.bytes_total as f64 * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_total > 0 && self.bytes_sent == self.bytes_total
    }
}

/// Bookkeeping record of one submitted upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadJob {
    pub id: UploadId,
    pub source_name: String,
    /// Sanitized, token-prefixed destination file name
    pub key: String,
    /// Full object path in the store
    pub path: String,
    pub progress: UploadProgress,
    pub state: UploadState,
    #[serde(skip)]
    pub error: Option<UploadError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadJob {
    pub(crate) fn new(source_name: String, key: String, path: String, bytes_total: u64) -> Self {
        let now = Utc::now();
        Self {
            id: UploadId::new(),
            source_name,
            key,
            path,
            progress: UploadProgress::new(0, bytes_total),
            state: UploadState::Validating,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn transition(&mut self, state: UploadState, error: Option<UploadError>) {
        self.state = state;
        self.error = error;
        self.updated_at = Utc::now();
    }
}

/// Notifications published while an upload runs; the terminal event is last
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Progress(UploadProgress),
    Succeeded(MediaReceipt),
    Failed(UploadError),
    Canceled,
}

impl UploadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// Whether the post-upload counter and catalog writes landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bookkeeping {
    Synchronized,
    /// The object is stored but some follow-up write failed
    Desynchronized { failures: Vec<String> },
}

impl Bookkeeping {
    pub fn is_synchronized(&self) -> bool {
        matches!(self, Self::Synchronized)
    }
}

/// Final result of an upload task
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Succeeded {
        receipt: MediaReceipt,
        record_id: Option<MediaRecordId>,
        bookkeeping: Bookkeeping,
    },
    Failed(UploadError),
    Canceled,
}

impl UploadOutcome {
    pub fn receipt(&self) -> Option<&MediaReceipt> {
        match self {
            Self::Succeeded { receipt, .. } => Some(receipt),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&UploadError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
