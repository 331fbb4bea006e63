use thiserror::Error;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Result type for media cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Why an upload did not succeed.
///
/// `Display` renders the stable, user-facing message for each kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Rejected before any network activity
    #[error("{message}")]
    Validation { message: String },

    #[error("You don't have permission to upload files")]
    Unauthorized,

    #[error("Upload was cancelled")]
    Canceled,

    #[error("File size mismatch. Try again with a different file.")]
    SizeMismatch,

    #[error("Upload failed too many times. Please check your connection.")]
    RetryLimitExceeded,

    #[error("Invalid file format. Try renaming the file or using a different file.")]
    InvalidArgument,

    #[error("Upload was aborted. Please try again.")]
    Aborted,

    #[error("Server error (500). This might be due to file name, size, or server issues. Try renaming the file or using a different file.")]
    ServerError { detail: String },

    #[error("Error uploading file")]
    Unknown { detail: String },
}

impl UploadError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Canceled => "canceled",
            Self::SizeMismatch => "size_mismatch",
            Self::RetryLimitExceeded => "retry_limit_exceeded",
            Self::InvalidArgument => "invalid_argument",
            Self::Aborted => "aborted",
            Self::ServerError { .. } => "server_error",
            Self::Unknown { .. } => "unknown",
        }
    }

    pub fn user_message(&self) -> String {
        self.to_string()
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Raw failure reported by an object storage backend.
///
/// Carries the backend's error code (`storage/unauthorized`, ...), an optional
/// error name (`AbortError`) and the free-form message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ObjectStoreError {
    pub code: String,
    pub name: Option<String>,
    pub message: String,
}

impl ObjectStoreError {
    pub const UNAUTHORIZED: &'static str = "storage/unauthorized";
    pub const CANCELED: &'static str = "storage/canceled";
    pub const WRONG_SIZE: &'static str = "storage/server-file-wrong-size";
    pub const RETRY_LIMIT_EXCEEDED: &'static str = "storage/retry-limit-exceeded";
    pub const INVALID_ARGUMENT: &'static str = "storage/invalid-argument";
    pub const UNKNOWN: &'static str = "storage/unknown";

    pub fn new<C, M>(code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            code: code.into(),
            name: None,
            message: message.into(),
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The transfer was torn down underneath the client
    pub fn abort<S: Into<String>>(message: S) -> Self {
        Self::new(Self::UNKNOWN, message).with_name("AbortError")
    }

    /// Non-success HTTP status surfaced by the backend
    pub fn http(status: u16) -> Self {
        Self::new(
            Self::UNKNOWN,
            format!("An unknown error occurred, please check the server response. ({status})"),
        )
    }

    /// Map the backend failure onto the closed upload error set.
    ///
    /// Codes win over the error name, which wins over message sniffing.
    pub fn classify(&self) -> UploadError {
        match self.code.as_str() {
            Self::UNAUTHORIZED => return UploadError::Unauthorized,
            Self::CANCELED => return UploadError::Canceled,
            Self::WRONG_SIZE => return UploadError::SizeMismatch,
            Self::RETRY_LIMIT_EXCEEDED => return UploadError::RetryLimitExceeded,
            Self::INVALID_ARGUMENT => return UploadError::InvalidArgument,
            _ => {}
        }

        if self.name.as_deref() == Some("AbortError") {
            UploadError::Aborted
        } else if self.message.contains("500") {
            UploadError::ServerError {
                detail: self.message.clone(),
            }
        } else {
            UploadError::Unknown {
                detail: self.to_string(),
            }
        }
    }
}

impl From<ObjectStoreError> for UploadError {
    fn from(error: ObjectStoreError) -> Self {
        error.classify()
    }
}

/// Failures retrieving remote media bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Cross-origin request blocked for {url}")]
    CrossOrigin { url: String },

    #[error("Media request failed with status {status}")]
    Status { status: u16 },

    #[error("Network error: {message}")]
    Network { message: String },
}

impl FetchError {
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }
}

/// Errors returned by the media cache
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Media fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The entry failed earlier and waits for revalidation
    #[error("Media unavailable, waiting for revalidation: {key}")]
    Degraded { key: String },

    #[error("Media fetch was interrupted: {key}")]
    Interrupted { key: String },
}

impl CacheError {
    pub fn degraded<S: Into<String>>(key: S) -> Self {
        Self::Degraded { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_to_closed_error_set() {
        let cases = [
            (ObjectStoreError::UNAUTHORIZED, UploadError::Unauthorized),
            (ObjectStoreError::CANCELED, UploadError::Canceled),
            (ObjectStoreError::WRONG_SIZE, UploadError::SizeMismatch),
            (ObjectStoreError::RETRY_LIMIT_EXCEEDED, UploadError::RetryLimitExceeded),
            (ObjectStoreError::INVALID_ARGUMENT, UploadError::InvalidArgument),
        ];
        for (code, expected) in cases {
            assert_eq!(ObjectStoreError::new(code, "boom").classify(), expected);
        }
    }

    #[test]
    fn test_abort_name_and_server_status_are_recognised() {
        assert_eq!(ObjectStoreError::abort("socket closed").classify(), UploadError::Aborted);
        assert_eq!(ObjectStoreError::http(500).classify().kind(), "server_error");
        assert_eq!(ObjectStoreError::http(404).classify().kind(), "unknown");
    }

    #[test]
    fn test_code_takes_precedence_over_name() {
        let error = ObjectStoreError::new(ObjectStoreError::UNAUTHORIZED, "HTTP 500").with_name("AbortError");
        assert_eq!(UploadError::from(error), UploadError::Unauthorized);
    }

    #[test]
    fn test_user_messages_are_stable() {
        assert_eq!(UploadError::Canceled.user_message(), "Upload was cancelled");
        assert_eq!(
            UploadError::Unknown { detail: "x".into() }.user_message(),
            "Error uploading file"
        );
        assert_eq!(UploadError::validation("Title is required").user_message(), "Title is required");
    }
}
