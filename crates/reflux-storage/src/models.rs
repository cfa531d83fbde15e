// Database models (internal, may differ from public DTOs)

use chrono::{DateTime, Utc};
use reflux_contracts::{
    Artifact, CleanupAudit, CleanupCounts, CleanupPreview, Flow, FlowVersion, LogLevel, Metric,
    Run, RunLog, RunStatus,
};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================
// Flow models
// ============================================

/// Flow row from database
#[derive(Debug, Clone, FromRow)]
pub struct FlowRow {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub spec: serde_json::Value,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FlowRow> for Flow {
    fn from(row: FlowRow) -> Self {
        Flow {
            id: row.id,
            name: row.name,
            version: row.version,
            description: row.description,
            spec: row.spec,
            tags: row.tags,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Input for creating a flow
#[derive(Debug, Clone)]
pub struct CreateFlow {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub spec: serde_json::Value,
    pub tags: Vec<String>,
    pub is_active: bool,
}

/// Input for a versioned flow update; `None` fields keep their current value
#[derive(Debug, Clone, Default)]
pub struct UpdateFlow {
    pub name: Option<String>,
    pub description: Option<String>,
    pub spec: Option<serde_json::Value>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
    /// Explicit new version; a patch bump of the current version otherwise
    pub version: Option<String>,
    pub changelog: Option<String>,
    pub updated_by: Option<String>,
}

/// Flow version snapshot row
#[derive(Debug, Clone, FromRow)]
pub struct FlowVersionRow {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub version: String,
    pub spec: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub changelog: Option<String>,
}

impl From<FlowVersionRow> for FlowVersion {
    fn from(row: FlowVersionRow) -> Self {
        FlowVersion {
            id: row.id,
            flow_id: row.flow_id,
            version: row.version,
            spec: row.spec,
            created_at: row.created_at,
            created_by: row.created_by,
            changelog: row.changelog,
        }
    }
}

// ============================================
// Run models
// ============================================

/// Run row from database
#[derive(Debug, Clone, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub flow_version: String,
    pub status: String,
    pub inputs: serde_json::Value,
    pub outputs: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl From<RunRow> for Run {
    fn from(row: RunRow) -> Self {
        let status = row.status.parse().unwrap_or(RunStatus::Pending);
        Run {
            id: row.id,
            flow_id: row.flow_id,
            flow_version: row.flow_version,
            status,
            inputs: row.inputs,
            outputs: row.outputs,
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
        }
    }
}

/// Input for creating a run (always starts `pending`)
#[derive(Debug, Clone)]
pub struct CreateRun {
    pub flow_id: Uuid,
    pub flow_version: String,
    pub inputs: serde_json::Value,
}

// ============================================
// Run log models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct RunLogRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl From<RunLogRow> for RunLog {
    fn from(row: RunLogRow) -> Self {
        RunLog {
            id: row.id,
            run_id: row.run_id,
            step_id: row.step_id,
            timestamp: row.timestamp,
            level: row.level.parse().unwrap_or(LogLevel::Info),
            message: row.message,
            data: row.data,
        }
    }
}

/// Input for one log line; timestamps are assigned at enqueue time so
/// buffering does not skew them
#[derive(Debug, Clone)]
pub struct CreateRunLog {
    pub run_id: Uuid,
    pub step_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// ============================================
// Artifact models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: String,
    pub key: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub storage_backend: String,
    pub etag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<ArtifactRow> for Artifact {
    fn from(row: ArtifactRow) -> Self {
        Artifact {
            id: row.id,
            run_id: row.run_id,
            step_id: row.step_id,
            key: row.key,
            size_bytes: row.size_bytes,
            content_type: row.content_type,
            storage_backend: row.storage_backend,
            etag: row.etag,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

/// Input for recording artifact metadata
#[derive(Debug, Clone)]
pub struct CreateArtifact {
    pub run_id: Uuid,
    pub step_id: String,
    pub key: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub storage_backend: String,
    pub etag: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================
// Metric models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct MetricRow {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub metric_type: String,
    pub flow_id: Option<Uuid>,
    pub run_id: Option<Uuid>,
    pub node_id: Option<String>,
    pub duration_ms: Option<i64>,
    pub status: String,
    pub error_type: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

impl From<MetricRow> for Metric {
    fn from(row: MetricRow) -> Self {
        Metric {
            id: row.id,
            timestamp: row.timestamp,
            metric_type: row
                .metric_type
                .parse()
                .unwrap_or(reflux_contracts::MetricType::WorkflowExecution),
            flow_id: row.flow_id,
            run_id: row.run_id,
            node_id: row.node_id,
            duration_ms: row.duration_ms,
            status: if row.status == "failure" {
                reflux_contracts::MetricStatus::Failure
            } else {
                reflux_contracts::MetricStatus::Success
            },
            error_type: row.error_type.and_then(|s| s.parse().ok()),
            tags: row.tags,
            metadata: row.metadata,
        }
    }
}

/// Input for one metric row
#[derive(Debug, Clone)]
pub struct CreateMetric {
    pub metric_type: String,
    pub flow_id: Option<Uuid>,
    pub run_id: Option<Uuid>,
    pub node_id: Option<String>,
    pub duration_ms: Option<i64>,
    pub status: String,
    pub error_type: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

// ============================================
// Cleanup audit models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct CleanupAuditRow {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub success: bool,
    pub dry_run: bool,
    pub retention_policy: serde_json::Value,
    pub preview: serde_json::Value,
    pub deleted: serde_json::Value,
    pub errors: Vec<String>,
    pub triggered_by: String,
}

impl From<CleanupAuditRow> for CleanupAudit {
    fn from(row: CleanupAuditRow) -> Self {
        CleanupAudit {
            id: row.id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
            success: row.success,
            dry_run: row.dry_run,
            retention_policy: row.retention_policy,
            preview: serde_json::from_value::<CleanupPreview>(row.preview).unwrap_or_default(),
            deleted: serde_json::from_value::<CleanupCounts>(row.deleted).unwrap_or_default(),
            errors: row.errors,
            triggered_by: row
                .triggered_by
                .parse()
                .unwrap_or(reflux_contracts::CleanupTrigger::Manual),
        }
    }
}

/// Input for one audit row, written after the cleanup finishes
#[derive(Debug, Clone)]
pub struct CreateCleanupAudit {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub success: bool,
    pub dry_run: bool,
    pub retention_policy: serde_json::Value,
    pub preview: CleanupPreview,
    pub deleted: CleanupCounts,
    pub errors: Vec<String>,
    pub triggered_by: String,
}
