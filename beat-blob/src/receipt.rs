use serde::{Deserialize, Serialize};

/// Descriptor returned after media has been stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReceipt {
    /// Full object path in the store
    pub path: String,
    /// Sanitized destination file name
    pub key: String,
    /// Download locator for the stored object
    pub url: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub created_at: i64,
}

impl MediaReceipt {
    /// Create a new media receipt
    pub fn new<P, K, U>(path: P, key: K, url: U, size_bytes: u64) -> Self
    where
        P: Into<String>,
        K: Into<String>,
        U: Into<String>,
    {
        Self {
            path: path.into(),
            key: key.into(),
            url: url.into(),
            size_bytes,
            content_type: None,
            etag: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Set content type
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set etag
    pub fn with_etag<S: Into<String>>(mut self, etag: S) -> Self {
        self.etag = Some(etag.into());
        self
    }
}
