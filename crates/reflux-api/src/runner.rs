// Flow runner abstraction
// Decision: trait seam keeps the HTTP layer agnostic to the execution
// backend; the in-process runner drives the engine on tokio tasks.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use reflux_engine::{ExecuteRequest, ExecutionOutcome, FlowExecutor, RunJournal};
use reflux_storage::Database;

/// Accepts persisted `pending` runs and drives them to a terminal state.
#[async_trait]
pub trait FlowRunner: Send + Sync {
    /// Accept a run: transition it to `running` and execute asynchronously.
    async fn start_run(&self, request: ExecuteRequest) -> Result<()>;

    /// Cancel a pending or running run; the engine observes the transition
    /// at its next level boundary. Returns whether a row actually
    /// transitioned — `false` means the run was already terminal.
    async fn cancel_run(&self, run_id: Uuid) -> Result<bool>;

    async fn is_running(&self, run_id: Uuid) -> bool;

    async fn active_count(&self) -> usize;
}

/// In-process runner executing workflows on tokio tasks.
pub struct InProcessRunner {
    db: Database,
    executor: Arc<FlowExecutor>,
    journal: Arc<dyn RunJournal>,
    active_runs: Arc<RwLock<HashMap<Uuid, JoinHandle<()>>>>,
}

impl InProcessRunner {
    pub fn new(db: Database, executor: Arc<FlowExecutor>, journal: Arc<dyn RunJournal>) -> Self {
        Self {
            db,
            executor,
            journal,
            active_runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl FlowRunner for InProcessRunner {
    async fn start_run(&self, request: ExecuteRequest) -> Result<()> {
        let run_id = request.run_id;
        info!(run_id = %run_id, flow = %request.flow_name, "accepting run");

        // pending -> running happens here; the engine owns failure
        // transitions, this task owns the completed write.
        self.db.mark_run_running(run_id).await?;

        let executor = self.executor.clone();
        let journal = self.journal.clone();
        let active_runs = self.active_runs.clone();

        let handle = tokio::spawn(async move {
            match executor.execute_run(request).await {
                Ok(ExecutionOutcome::Completed(output)) => {
                    if let Err(err) = journal.mark_completed(run_id, &output.outputs).await {
                        warn!(run_id = %run_id, error = %err, "failed to persist completion");
                    }
                }
                Ok(ExecutionOutcome::Cancelled) => {
                    info!(run_id = %run_id, "run observed cancellation");
                }
                Err(err) => {
                    // Already journaled as failed by the engine
                    info!(run_id = %run_id, error = %err, "run failed");
                }
            }
            active_runs.write().await.remove(&run_id);
        });

        self.active_runs.write().await.insert(run_id, handle);
        Ok(())
    }

    async fn cancel_run(&self, run_id: Uuid) -> Result<bool> {
        info!(run_id = %run_id, "cancelling run");
        // The row flips immediately; the executing task is never aborted so
        // in-flight nodes can finish and the engine stops at the next level.
        let cancelled = self.db.mark_run_cancelled(run_id).await?;
        if !cancelled {
            info!(run_id = %run_id, "run already terminal, cancel is a no-op");
        }
        Ok(cancelled)
    }

    async fn is_running(&self, run_id: Uuid) -> bool {
        self.active_runs.read().await.contains_key(&run_id)
    }

    async fn active_count(&self) -> usize {
        self.active_runs.read().await.len()
    }
}
