//! Typed errors for node handlers and dispatch

use reflux_contracts::ErrorKind;

/// Error raised by a node handler.
///
/// Handlers should pick the variant matching the failure; the engine maps it
/// straight onto the metric/run `error_type` taxonomy. Substring
/// classification only happens for untyped messages wrapped in `Execution`.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Parameters failed validation before any side effect
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The node's own work exceeded its budget
    #[error("timeout: {0}")]
    Timeout(String),

    /// The node ran and failed
    #[error("{0}")]
    Execution(String),
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Validation(_) => ErrorKind::ValidationError,
            NodeError::NotFound(_) => ErrorKind::NotFound,
            NodeError::Timeout(_) => ErrorKind::Timeout,
            NodeError::Execution(msg) => ErrorKind::classify_message(msg),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        NodeError::Validation(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        NodeError::Execution(msg.into())
    }
}

/// Error returned by a dispatch call.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handler registered for the address
    #[error("no handler registered for {address}")]
    NotFound { address: String },

    /// The requested version string is not valid
    #[error("invalid version {version:?} for {name}: {reason}")]
    InvalidVersion {
        name: String,
        version: String,
        reason: String,
    },

    /// The call did not return within the request timeout
    #[error("dispatch to {address} timed out after {timeout_ms}ms")]
    Timeout { address: String, timeout_ms: u64 },

    /// The handler executed and failed
    #[error(transparent)]
    Handler(#[from] NodeError),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::NotFound { .. } => ErrorKind::NotFound,
            DispatchError::InvalidVersion { .. } => ErrorKind::ValidationError,
            DispatchError::Timeout { .. } => ErrorKind::Timeout,
            DispatchError::Handler(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_error_kinds_map_onto_taxonomy() {
        assert_eq!(
            NodeError::validation("bad url").kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            NodeError::NotFound("flow".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(NodeError::Timeout("30s".into()).kind(), ErrorKind::Timeout);
        assert_eq!(
            NodeError::execution("boom").kind(),
            ErrorKind::ExecutionError
        );
    }

    #[test]
    fn untyped_execution_messages_fall_back_to_substring_classification() {
        assert_eq!(
            NodeError::execution("upstream timeout exceeded").kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn dispatch_error_kinds() {
        let err = DispatchError::NotFound {
            address: "1.0.0.nodes.x.execute".into(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = DispatchError::Timeout {
            address: "1.0.0.nodes.x.execute".into(),
            timeout_ms: 30_000,
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
