// Flow and flow-version DTOs for the public API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A named, versioned workflow definition (the template).
///
/// `(name, version)` is unique; `spec` mutation goes through the versioning
/// path so the prior state is always snapshotted into a [`FlowVersion`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Flow {
    pub id: Uuid,
    pub name: String,
    /// Semver string, e.g. `1.2.0`
    pub version: String,
    pub description: Option<String>,
    pub spec: serde_json::Value,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable snapshot of a flow taken before an update or rollback.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FlowVersion {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub version: String,
    pub spec: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub changelog: Option<String>,
}

/// Side-by-side comparison of two flow versions with a shallow diff summary.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FlowVersionComparison {
    pub flow_id: Uuid,
    pub version1: FlowVersion,
    pub version2: FlowVersion,
    pub diff: FlowSpecDiff,
}

/// Shallow diff between two specs: node ids added/removed and params changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct FlowSpecDiff {
    pub nodes_added: Vec<String>,
    pub nodes_removed: Vec<String>,
    pub nodes_changed: Vec<String>,
    pub edges_added: usize,
    pub edges_removed: usize,
}
