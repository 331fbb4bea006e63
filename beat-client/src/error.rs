use thiserror::Error;

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors from the connectivity monitor task
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor join error: {0}")]
    Join(String),
}
