use thiserror::Error;

/// Result type for document store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a document store can report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document not found: {id}")]
    NotFound { id: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Store unavailable (client is offline): {message}")]
    Unavailable { message: String },
}

impl StoreError {
    /// Create a not found error
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a permission denied error
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Offline/network failures are worth retrying, everything else is not
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors from the best-effort profile counter capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("No active session to attribute the counter write to")]
    NoSession,

    #[error(transparent)]
    Store(#[from] StoreError),
}
