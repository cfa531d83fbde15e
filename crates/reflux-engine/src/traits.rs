//! Seams the engine drives: run journal, step logs, metric emission
//!
//! The storage crate provides the Postgres-backed implementations; tests use
//! in-memory stand-ins. Log and metric emission are fire-and-forget —
//! instrumentation must never fail or stall a workflow.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use reflux_contracts::{ErrorKind, LogLevel, MetricStatus, MetricType, RunStatus};

/// Error from a journal write.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable run-state transitions, idempotent at the store.
#[async_trait]
pub trait RunJournal: Send + Sync {
    /// Current status of the run row.
    async fn status(&self, run_id: Uuid) -> Result<RunStatus, JournalError>;

    /// Transition to `completed` with outputs. Guarded by
    /// `status != 'completed'`; returns whether a row actually changed.
    async fn mark_completed(&self, run_id: Uuid, outputs: &Value) -> Result<bool, JournalError>;

    /// Transition to `failed` with an error message. Guarded by
    /// `status NOT IN ('failed','completed')`; returns whether a row changed.
    async fn mark_failed(&self, run_id: Uuid, error: &str) -> Result<bool, JournalError>;
}

/// One buffered log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub run_id: Uuid,
    pub step_id: String,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<Value>,
}

/// Buffered, back-pressured log sink. Enqueue only; persistence happens on
/// the sink's own schedule and may drop under pressure.
pub trait StepLogger: Send + Sync {
    fn log(&self, entry: LogEntry);
}

/// One metric observation.
#[derive(Debug, Clone)]
pub struct MetricEvent {
    pub metric_type: MetricType,
    pub flow_id: Option<Uuid>,
    pub run_id: Option<Uuid>,
    pub node_id: Option<String>,
    pub duration_ms: Option<i64>,
    pub status: MetricStatus,
    pub error_type: Option<ErrorKind>,
    pub tags: Vec<String>,
}

/// Best-effort metric sink.
pub trait MetricSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

/// Sink that discards everything; for tests and bare setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStepLogger;

impl StepLogger for NoopStepLogger {
    fn log(&self, _entry: LogEntry) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricSink;

impl MetricSink for NoopMetricSink {
    fn record(&self, _event: MetricEvent) {}
}
