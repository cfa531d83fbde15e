//! Retention error taxonomy

/// Errors from retention operations.
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    /// Another instance holds the cleanup lock
    #[error("cleanup is already running on another instance")]
    Locked,

    /// A policy value fell outside its documented bounds
    #[error("invalid retention policy: {0}")]
    Policy(String),

    /// The store rejected a scan or delete
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for RetentionError {
    fn from(err: anyhow::Error) -> Self {
        RetentionError::Storage(err.to_string())
    }
}
