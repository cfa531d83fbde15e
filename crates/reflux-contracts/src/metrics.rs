// Metric row DTOs and the error taxonomy
// Metric rows in Postgres are the authoritative storage; any in-memory
// registry is a cache on top of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One metric row, emitted per workflow execution and per node execution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Metric {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub metric_type: MetricType,
    pub flow_id: Option<Uuid>,
    pub run_id: Option<Uuid>,
    pub node_id: Option<String>,
    pub duration_ms: Option<i64>,
    pub status: MetricStatus,
    pub error_type: Option<ErrorKind>,
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    WorkflowExecution,
    NodeExecution,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricType::WorkflowExecution => write!(f, "workflow_execution"),
            MetricType::NodeExecution => write!(f, "node_execution"),
        }
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workflow_execution" => Ok(MetricType::WorkflowExecution),
            "node_execution" => Ok(MetricType::NodeExecution),
            _ => Err(format!("Unknown metric type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Success,
    Failure,
}

impl std::fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricStatus::Success => write!(f, "success"),
            MetricStatus::Failure => write!(f, "failure"),
        }
    }
}

/// One-of failure classification surfaced as `error_type` on metrics, run
/// rows, and HTTP responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Dispatch or activity exceeded its budget; retryable upstream
    Timeout,
    /// Flow, run, or node type missing
    NotFound,
    /// Bad spec, bad inputs, bad condition; never retryable
    ValidationError,
    /// A node handler failed
    ExecutionError,
    /// Underlying store unavailable
    StorageError,
}

impl ErrorKind {
    /// Heuristic fallback for untyped error messages from legacy handlers.
    /// Typed errors should be classified at the source instead.
    pub fn classify_message(message: &str) -> ErrorKind {
        let lower = message.to_lowercase();
        if lower.contains("timeout") {
            ErrorKind::Timeout
        } else if lower.contains("not found") {
            ErrorKind::NotFound
        } else if lower.contains("validation") || lower.contains("invalid") {
            ErrorKind::ValidationError
        } else {
            ErrorKind::ExecutionError
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::ValidationError => write!(f, "validation_error"),
            ErrorKind::ExecutionError => write!(f, "execution_error"),
            ErrorKind::StorageError => write!(f, "storage_error"),
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(ErrorKind::Timeout),
            "not_found" => Ok(ErrorKind::NotFound),
            "validation_error" => Ok(ErrorKind::ValidationError),
            "execution_error" => Ok(ErrorKind::ExecutionError),
            "storage_error" => Ok(ErrorKind::StorageError),
            _ => Err(format!("Unknown error kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_on_substrings() {
        assert_eq!(
            ErrorKind::classify_message("request timeout exceeded"),
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorKind::classify_message("handler not found for address"),
            ErrorKind::NotFound
        );
        assert_eq!(
            ErrorKind::classify_message("validation failed: url required"),
            ErrorKind::ValidationError
        );
        assert_eq!(
            ErrorKind::classify_message("invalid condition syntax"),
            ErrorKind::ValidationError
        );
        assert_eq!(
            ErrorKind::classify_message("boom"),
            ErrorKind::ExecutionError
        );
    }
}
