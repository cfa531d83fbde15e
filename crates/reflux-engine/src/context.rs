//! Per-run execution context
//!
//! Accumulated while a run executes and local to its scheduling task; never
//! shared between runs. Reconstructible from persisted node outputs and logs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use reflux_contracts::ErrorKind;

/// Outcome of one node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub output: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
}

impl NodeResult {
    pub fn success(output: Value, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            output,
            started_at,
            finished_at,
            error: None,
            error_type: None,
        }
    }

    pub fn failure(
        error: String,
        error_type: ErrorKind,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            output: Value::Null,
            started_at,
            finished_at,
            error: Some(error),
            error_type: Some(error_type),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// `{ inputs, nodes }` accumulated during a run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub inputs: Value,
    /// Completed node results keyed by node id; BTreeMap keeps serialized
    /// output deterministic.
    pub nodes: BTreeMap<String, NodeResult>,
}

impl ExecutionContext {
    pub fn new(inputs: Value) -> Self {
        Self {
            inputs,
            nodes: BTreeMap::new(),
        }
    }

    /// Serialized view of the node map, as delivered in dispatch metadata and
    /// persisted as run outputs.
    pub fn nodes_json(&self) -> Value {
        serde_json::to_value(&self.nodes).unwrap_or(Value::Null)
    }
}
