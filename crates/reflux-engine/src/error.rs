//! Engine error taxonomy

use reflux_contracts::ErrorKind;

/// Errors from workflow execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad spec: empty node list, dangling edge, duplicate id, or cycle.
    /// Never retryable.
    #[error("{0}")]
    Validation(String),

    /// One or more nodes in a level failed; the aggregated message names
    /// every failed node with its classified kind.
    #[error("{message}")]
    WorkflowFailed { level: usize, message: String },

    /// The run journal (store) rejected a required write
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::ValidationError,
            EngineError::WorkflowFailed { .. } => ErrorKind::ExecutionError,
            EngineError::Storage(_) => ErrorKind::StorageError,
        }
    }
}
