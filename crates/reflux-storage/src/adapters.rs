//! Database-backed implementations of the engine seams
//!
//! The engine talks to [`reflux_engine::RunJournal`] and
//! [`reflux_engine::MetricSink`]; these adapters put Postgres behind them.
//! Metric emission is asynchronous through a bounded channel with explicit
//! drop-on-full semantics — instrumentation never stalls a workflow.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use reflux_contracts::RunStatus;
use reflux_engine::{JournalError, MetricEvent, MetricSink, RunJournal};

use crate::models::CreateMetric;
use crate::repositories::Database;

// ============================================================================
// DbRunJournal - idempotent status transitions over the runs table
// ============================================================================

#[derive(Clone)]
pub struct DbRunJournal {
    db: Database,
}

impl DbRunJournal {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RunJournal for DbRunJournal {
    async fn status(&self, run_id: Uuid) -> Result<RunStatus, JournalError> {
        let row = self
            .db
            .get_run(run_id)
            .await
            .map_err(|e| JournalError::Storage(e.to_string()))?
            .ok_or(JournalError::RunNotFound(run_id))?;
        Ok(row.status.parse().unwrap_or(RunStatus::Pending))
    }

    async fn mark_completed(&self, run_id: Uuid, outputs: &Value) -> Result<bool, JournalError> {
        self.db
            .mark_run_completed(run_id, outputs)
            .await
            .map_err(|e| JournalError::Storage(e.to_string()))
    }

    async fn mark_failed(&self, run_id: Uuid, error: &str) -> Result<bool, JournalError> {
        self.db
            .mark_run_failed(run_id, error)
            .await
            .map_err(|e| JournalError::Storage(e.to_string()))
    }
}

// ============================================================================
// DbMetricSink - buffered metric rows
// ============================================================================

pub struct DbMetricSink {
    tx: mpsc::Sender<MetricEvent>,
}

impl DbMetricSink {
    /// Spawn the insert task. `capacity` bounds in-flight events; overflow is
    /// dropped with a warning.
    pub fn spawn(db: Database, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<MetricEvent>(capacity);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let input = CreateMetric {
                    metric_type: event.metric_type.to_string(),
                    flow_id: event.flow_id,
                    run_id: event.run_id,
                    node_id: event.node_id,
                    duration_ms: event.duration_ms,
                    status: event.status.to_string(),
                    error_type: event.error_type.map(|k| k.to_string()),
                    tags: event.tags,
                    metadata: None,
                };
                if let Err(err) = db.insert_metric(input).await {
                    warn!(error = %err, "failed to persist metric row");
                }
            }
        });
        Self { tx }
    }
}

impl MetricSink for DbMetricSink {
    fn record(&self, event: MetricEvent) {
        if self.tx.try_send(event).is_err() {
            warn!("metric buffer full, dropping event");
        }
    }
}
