// Retention policy and cleanup DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Per-category retention limits. Each field is validated against documented
/// bounds when loaded; out-of-bounds values reject the whole policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RetentionPolicy {
    pub runs: RunRetention,
    pub logs: LogRetention,
    pub artifacts: ArtifactRetention,
    pub flow_versions: FlowVersionRetention,
    pub metrics: MetricRetention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunRetention {
    /// Days to keep completed runs (1-3650)
    pub successful_days: u32,
    /// Days to keep failed runs (1-3650)
    pub failed_days: u32,
    /// Days to keep cancelled runs (1-3650)
    pub cancelled_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LogRetention {
    /// Days per level, each 1-365
    pub debug_days: u32,
    pub info_days: u32,
    pub warn_days: u32,
    pub error_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ArtifactRetention {
    /// Days to keep artifacts without an explicit expiry (1-3650)
    pub default_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FlowVersionRetention {
    /// Most-recent versions kept per flow regardless of age (1-100)
    pub keep_recent: u32,
    /// Versions younger than this many days are never pruned (1-365)
    pub min_age_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetricRetention {
    /// Days to keep raw metric rows (1-3650)
    pub raw_days: u32,
}

/// Read-only counts produced before any delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CleanupPreview {
    pub runs_successful: i64,
    pub runs_failed: i64,
    pub runs_cancelled: i64,
    pub logs_debug: i64,
    pub logs_info: i64,
    pub logs_warn: i64,
    pub logs_error: i64,
    pub artifacts: i64,
    pub flow_versions: i64,
    pub metrics: i64,
    /// Rough storage estimate for the rows above
    pub estimated_bytes: i64,
}

impl CleanupPreview {
    pub fn total_rows(&self) -> i64 {
        self.runs_successful
            + self.runs_failed
            + self.runs_cancelled
            + self.logs_debug
            + self.logs_info
            + self.logs_warn
            + self.logs_error
            + self.artifacts
            + self.flow_versions
            + self.metrics
    }
}

/// Final deleted counts for one cleanup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CleanupCounts {
    pub runs_successful: u64,
    pub runs_failed: u64,
    pub runs_cancelled: u64,
    pub logs: u64,
    pub artifacts: u64,
    pub flow_versions: u64,
    pub metrics: u64,
}

impl CleanupCounts {
    pub fn total(&self) -> u64 {
        self.runs_successful
            + self.runs_failed
            + self.runs_cancelled
            + self.logs
            + self.artifacts
            + self.flow_versions
            + self.metrics
    }
}

/// What triggered a cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    Scheduled,
    Manual,
}

impl std::fmt::Display for CleanupTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupTrigger::Scheduled => write!(f, "scheduled"),
            CleanupTrigger::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for CleanupTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(CleanupTrigger::Scheduled),
            "manual" => Ok(CleanupTrigger::Manual),
            _ => Err(format!("Unknown cleanup trigger: {}", s)),
        }
    }
}

/// Durable record of one retention run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CleanupAudit {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub success: bool,
    pub dry_run: bool,
    /// Policy snapshot the cleanup ran against
    pub retention_policy: serde_json::Value,
    pub preview: CleanupPreview,
    pub deleted: CleanupCounts,
    pub errors: Vec<String>,
    pub triggered_by: CleanupTrigger,
}

/// Outcome returned by a cleanup invocation (dry-run or real).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub preview: CleanupPreview,
    pub deleted: CleanupCounts,
    pub duration_ms: i64,
    pub errors: Vec<String>,
}
