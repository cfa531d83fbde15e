//! Level-scheduled workflow execution

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use reflux_bus::{DispatchError, DispatchMeta, NodeBus};
use reflux_contracts::{
    ErrorKind, FlowSpec, LogLevel, MetricStatus, MetricType, NodeSpec, RunStatus,
};

use crate::context::{ExecutionContext, NodeResult};
use crate::dag;
use crate::error::EngineError;
use crate::template;
use crate::traits::{LogEntry, MetricEvent, MetricSink, RunJournal, StepLogger};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Version used when a node spec does not pin one
    pub default_node_version: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_node_version: "1.0.0".to_string(),
        }
    }
}

/// One execution request. The caller has already persisted the run in
/// `pending` and transitioned it to `running` on acceptance.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub run_id: Uuid,
    pub flow_id: Uuid,
    pub flow_name: String,
    pub spec: FlowSpec,
    pub inputs: Value,
}

/// Successful result: the accumulated node map, both as the raw context and
/// serialized for persistence.
#[derive(Debug)]
pub struct RunOutput {
    pub outputs: Value,
    pub nodes: BTreeMap<String, NodeResult>,
}

/// How a run ended from the engine's point of view.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Completed(RunOutput),
    /// The run row was externally cancelled; observed at a level boundary.
    Cancelled,
}

/// The workflow runtime: validates the DAG, computes execution levels, and
/// runs them with per-level parallelism.
///
/// Failure transitions are written here; the caller writes `completed`.
pub struct FlowExecutor {
    bus: Arc<dyn NodeBus>,
    journal: Arc<dyn RunJournal>,
    logger: Arc<dyn StepLogger>,
    metrics: Arc<dyn MetricSink>,
    config: ExecutorConfig,
}

/// Outcome of one dispatched node, before it is folded into the context.
struct NodeOutcome {
    node_id: String,
    result: Result<Value, DispatchError>,
    started_at: chrono::DateTime<Utc>,
    finished_at: chrono::DateTime<Utc>,
}

impl FlowExecutor {
    pub fn new(
        bus: Arc<dyn NodeBus>,
        journal: Arc<dyn RunJournal>,
        logger: Arc<dyn StepLogger>,
        metrics: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            bus,
            journal,
            logger,
            metrics,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute a run to completion, failure, or observed cancellation.
    pub async fn execute_run(&self, req: ExecuteRequest) -> Result<ExecutionOutcome, EngineError> {
        let workflow_started = Utc::now();

        let schedule = match dag::level_schedule(&req.spec) {
            Ok(schedule) => schedule,
            Err(err) => {
                self.fail_run(&req, workflow_started, ErrorKind::ValidationError, &err)
                    .await;
                return Err(err);
            }
        };

        info!(
            run_id = %req.run_id,
            flow = %req.flow_name,
            levels = schedule.len(),
            nodes = req.spec.nodes.len(),
            "executing workflow"
        );

        let by_id: HashMap<&str, &NodeSpec> = req
            .spec
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n))
            .collect();

        let mut ctx = ExecutionContext::new(req.inputs.clone());

        for (level_idx, level) in schedule.iter().enumerate() {
            if self.run_is_cancelled(req.run_id).await {
                info!(run_id = %req.run_id, level = level_idx, "run cancelled, stopping");
                self.logger.log(LogEntry {
                    run_id: req.run_id,
                    step_id: String::new(),
                    level: LogLevel::Info,
                    message: format!("Cancelled before level {level_idx}"),
                    data: None,
                });
                return Ok(ExecutionOutcome::Cancelled);
            }

            debug!(run_id = %req.run_id, level = level_idx, width = level.len(), "starting level");

            let outcomes = self.run_level(&req, level, &by_id, &ctx).await;

            let mut failures: Vec<(String, String, ErrorKind)> = Vec::new();
            for outcome in outcomes {
                let duration = (outcome.finished_at - outcome.started_at).num_milliseconds();
                match outcome.result {
                    Ok(output) => {
                        self.logger.log(LogEntry {
                            run_id: req.run_id,
                            step_id: outcome.node_id.clone(),
                            level: LogLevel::Info,
                            message: format!("Node completed in {duration}ms"),
                            data: None,
                        });
                        self.record_node_metric(&req, &outcome.node_id, duration, None);
                        ctx.nodes.insert(
                            outcome.node_id,
                            NodeResult::success(output, outcome.started_at, outcome.finished_at),
                        );
                    }
                    Err(err) => {
                        let kind = err.kind();
                        let message = err.to_string();
                        self.logger.log(LogEntry {
                            run_id: req.run_id,
                            step_id: outcome.node_id.clone(),
                            level: LogLevel::Error,
                            message: format!("Node failed: {message}"),
                            data: Some(serde_json::json!({ "error_type": kind.to_string() })),
                        });
                        self.record_node_metric(&req, &outcome.node_id, duration, Some(kind));
                        ctx.nodes.insert(
                            outcome.node_id.clone(),
                            NodeResult::failure(
                                message.clone(),
                                kind,
                                outcome.started_at,
                                outcome.finished_at,
                            ),
                        );
                        failures.push((outcome.node_id, message, kind));
                    }
                }
            }

            if !failures.is_empty() {
                let details = failures
                    .iter()
                    .map(|(id, msg, kind)| format!("{id}: {msg} ({kind})"))
                    .collect::<Vec<_>>()
                    .join("; ");
                let message =
                    format!("Workflow failed at level {level_idx}. Failed nodes: {details}");
                let err = EngineError::WorkflowFailed {
                    level: level_idx,
                    message,
                };
                self.fail_run(&req, workflow_started, failures[0].2, &err).await;
                return Err(err);
            }
        }

        let total_ms = (Utc::now() - workflow_started).num_milliseconds();
        info!(run_id = %req.run_id, duration_ms = total_ms, "workflow completed");
        self.metrics.record(MetricEvent {
            metric_type: MetricType::WorkflowExecution,
            flow_id: Some(req.flow_id),
            run_id: Some(req.run_id),
            node_id: None,
            duration_ms: Some(total_ms),
            status: MetricStatus::Success,
            error_type: None,
            tags: vec![req.flow_name.clone()],
        });

        Ok(ExecutionOutcome::Completed(RunOutput {
            outputs: ctx.nodes_json(),
            nodes: ctx.nodes,
        }))
    }

    /// Dispatch every node in a level concurrently and await them all; a
    /// failing node never aborts its siblings mid-flight.
    async fn run_level(
        &self,
        req: &ExecuteRequest,
        level: &[String],
        by_id: &HashMap<&str, &NodeSpec>,
        ctx: &ExecutionContext,
    ) -> Vec<NodeOutcome> {
        let nodes_snapshot = ctx.nodes_json();

        let futures = level.iter().map(|node_id| {
            let node = by_id[node_id.as_str()];
            let params = template::resolve_params(&node.params, ctx);
            let version = node
                .version
                .clone()
                .unwrap_or_else(|| self.config.default_node_version.clone());
            let meta = DispatchMeta {
                run_id: req.run_id,
                step_id: node.id.clone(),
                inputs: ctx.inputs.clone(),
                nodes: nodes_snapshot.clone(),
            };
            let bus = self.bus.clone();
            async move {
                let started_at = Utc::now();
                let result = bus.dispatch(&node.node_type, &version, params, meta).await;
                NodeOutcome {
                    node_id: node.id.clone(),
                    result,
                    started_at,
                    finished_at: Utc::now(),
                }
            }
        });

        join_all(futures).await
    }

    async fn run_is_cancelled(&self, run_id: Uuid) -> bool {
        match self.journal.status(run_id).await {
            Ok(status) => status == RunStatus::Cancelled,
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "could not read run status");
                false
            }
        }
    }

    fn record_node_metric(
        &self,
        req: &ExecuteRequest,
        node_id: &str,
        duration_ms: i64,
        error_type: Option<ErrorKind>,
    ) {
        self.metrics.record(MetricEvent {
            metric_type: MetricType::NodeExecution,
            flow_id: Some(req.flow_id),
            run_id: Some(req.run_id),
            node_id: Some(node_id.to_string()),
            duration_ms: Some(duration_ms),
            status: if error_type.is_none() {
                MetricStatus::Success
            } else {
                MetricStatus::Failure
            },
            error_type,
            tags: vec![req.flow_name.clone()],
        });
    }

    /// Write the failed terminal state and the workflow failure metric.
    /// Journal write failures are logged, not propagated; the workflow error
    /// is the caller-visible signal.
    async fn fail_run(
        &self,
        req: &ExecuteRequest,
        workflow_started: chrono::DateTime<Utc>,
        kind: ErrorKind,
        err: &EngineError,
    ) {
        if let Err(journal_err) = self.journal.mark_failed(req.run_id, &err.to_string()).await {
            warn!(run_id = %req.run_id, error = %journal_err, "failed to persist run failure");
        }
        self.metrics.record(MetricEvent {
            metric_type: MetricType::WorkflowExecution,
            flow_id: Some(req.flow_id),
            run_id: Some(req.run_id),
            node_id: None,
            duration_ms: Some((Utc::now() - workflow_started).num_milliseconds()),
            status: MetricStatus::Failure,
            error_type: Some(kind),
            tags: vec![req.flow_name.clone()],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::JournalError;
    use async_trait::async_trait;
    use reflux_bus::NodeSchema;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Bus stub: per-name behaviors, counts every dispatch.
    struct StubBus {
        dispatches: AtomicUsize,
        behaviors: HashMap<String, Behavior>,
    }

    enum Behavior {
        Echo,
        Return(Value),
        SleepThenReturn(Duration, Value),
        Fail(&'static str),
        SleepThenFail(Duration, &'static str),
    }

    impl StubBus {
        fn new(behaviors: Vec<(&str, Behavior)>) -> Self {
            Self {
                dispatches: AtomicUsize::new(0),
                behaviors: behaviors
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            }
        }

        fn count(&self) -> usize {
            self.dispatches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NodeBus for StubBus {
        async fn dispatch(
            &self,
            name: &str,
            _version: &str,
            params: Value,
            _meta: DispatchMeta,
        ) -> Result<Value, DispatchError> {
            self.dispatches.fetch_add(1, Ordering::SeqCst);
            match self.behaviors.get(name) {
                Some(Behavior::Echo) => Ok(params),
                Some(Behavior::Return(v)) => Ok(v.clone()),
                Some(Behavior::SleepThenReturn(d, v)) => {
                    tokio::time::sleep(*d).await;
                    Ok(v.clone())
                }
                Some(Behavior::Fail(msg)) => {
                    Err(DispatchError::Handler(reflux_bus::NodeError::execution(*msg)))
                }
                Some(Behavior::SleepThenFail(d, msg)) => {
                    tokio::time::sleep(*d).await;
                    Err(DispatchError::Handler(reflux_bus::NodeError::execution(*msg)))
                }
                None => Err(DispatchError::NotFound {
                    address: format!("1.0.0.{name}.execute"),
                }),
            }
        }

        fn list_schemas(&self) -> Vec<NodeSchema> {
            Vec::new()
        }
    }

    /// In-memory journal with the same guard semantics as the store.
    #[derive(Default)]
    struct MemJournal {
        state: Mutex<HashMap<Uuid, (RunStatus, Option<String>)>>,
    }

    impl MemJournal {
        fn insert(&self, run_id: Uuid, status: RunStatus) {
            self.state.lock().unwrap().insert(run_id, (status, None));
        }

        fn status_of(&self, run_id: Uuid) -> RunStatus {
            self.state.lock().unwrap()[&run_id].0
        }

        fn error_of(&self, run_id: Uuid) -> Option<String> {
            self.state.lock().unwrap()[&run_id].1.clone()
        }
    }

    #[async_trait]
    impl RunJournal for MemJournal {
        async fn status(&self, run_id: Uuid) -> Result<RunStatus, JournalError> {
            self.state
                .lock()
                .unwrap()
                .get(&run_id)
                .map(|(s, _)| *s)
                .ok_or(JournalError::RunNotFound(run_id))
        }

        async fn mark_completed(&self, run_id: Uuid, _outputs: &Value) -> Result<bool, JournalError> {
            let mut state = self.state.lock().unwrap();
            let entry = state
                .get_mut(&run_id)
                .ok_or(JournalError::RunNotFound(run_id))?;
            if entry.0 == RunStatus::Completed {
                return Ok(false);
            }
            entry.0 = RunStatus::Completed;
            Ok(true)
        }

        async fn mark_failed(&self, run_id: Uuid, error: &str) -> Result<bool, JournalError> {
            let mut state = self.state.lock().unwrap();
            let entry = state
                .get_mut(&run_id)
                .ok_or(JournalError::RunNotFound(run_id))?;
            if matches!(entry.0, RunStatus::Completed | RunStatus::Failed) {
                return Ok(false);
            }
            entry.0 = RunStatus::Failed;
            entry.1 = Some(error.to_string());
            Ok(true)
        }
    }

    #[derive(Default)]
    struct VecSink {
        events: Mutex<Vec<MetricEvent>>,
    }

    impl MetricSink for VecSink {
        fn record(&self, event: MetricEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn node(id: &str, node_type: &str, params: Value) -> reflux_contracts::NodeSpec {
        reflux_contracts::NodeSpec {
            id: id.to_string(),
            node_type: node_type.to_string(),
            params,
            version: None,
        }
    }

    fn edge(from: &str, to: &str) -> reflux_contracts::EdgeSpec {
        reflux_contracts::EdgeSpec {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    struct Harness {
        bus: Arc<StubBus>,
        journal: Arc<MemJournal>,
        sink: Arc<VecSink>,
        executor: FlowExecutor,
    }

    fn harness(behaviors: Vec<(&str, Behavior)>) -> Harness {
        let bus = Arc::new(StubBus::new(behaviors));
        let journal = Arc::new(MemJournal::default());
        let sink = Arc::new(VecSink::default());
        let executor = FlowExecutor::new(
            bus.clone(),
            journal.clone(),
            Arc::new(crate::traits::NoopStepLogger),
            sink.clone(),
        );
        Harness {
            bus,
            journal,
            sink,
            executor,
        }
    }

    fn request(spec: FlowSpec, inputs: Value, run_id: Uuid) -> ExecuteRequest {
        ExecuteRequest {
            run_id,
            flow_id: Uuid::now_v7(),
            flow_name: "test-flow".to_string(),
            spec,
            inputs,
        }
    }

    #[tokio::test]
    async fn linear_chain_threads_outputs_through_templates() {
        let h = harness(vec![
            ("nodes.fetch", Behavior::Return(json!({ "data": { "n": 3 } }))),
            ("nodes.echo", Behavior::Echo),
        ]);
        let run_id = Uuid::now_v7();
        h.journal.insert(run_id, RunStatus::Running);

        let spec = FlowSpec {
            nodes: vec![
                node("a", "nodes.fetch", json!({})),
                node("b", "nodes.echo", json!({ "n": "{{nodes.a.output.data.n}}" })),
            ],
            edges: vec![edge("a", "b")],
        };

        let outcome = h
            .executor
            .execute_run(request(spec, json!({}), run_id))
            .await
            .unwrap();
        let ExecutionOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(output.nodes["b"].output, json!({ "n": 3 }));
        assert_eq!(h.bus.count(), 2);
        // Engine leaves the run `running`; the caller writes `completed`.
        assert_eq!(h.journal.status_of(run_id), RunStatus::Running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn siblings_in_a_level_run_concurrently() {
        let h = harness(vec![
            (
                "nodes.slow",
                Behavior::SleepThenReturn(Duration::from_millis(150), json!({})),
            ),
        ]);
        let run_id = Uuid::now_v7();
        h.journal.insert(run_id, RunStatus::Running);

        let spec = FlowSpec {
            nodes: vec![
                node("x", "nodes.slow", json!({})),
                node("y", "nodes.slow", json!({})),
                node("z", "nodes.slow", json!({})),
            ],
            edges: vec![],
        };

        let started = std::time::Instant::now();
        h.executor
            .execute_run(request(spec, json!({}), run_id))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        // max(d) plus fuzz, not the 450ms a serial level would take
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(400), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn sibling_failures_are_aggregated_and_downstream_is_skipped() {
        let h = harness(vec![
            (
                "nodes.slowfail",
                Behavior::SleepThenFail(Duration::from_millis(20), "timeout exceeded"),
            ),
            ("nodes.fail", Behavior::Fail("boom")),
            ("nodes.echo", Behavior::Echo),
        ]);
        let run_id = Uuid::now_v7();
        h.journal.insert(run_id, RunStatus::Running);

        let spec = FlowSpec {
            nodes: vec![
                node("bad1", "nodes.slowfail", json!({})),
                node("bad2", "nodes.fail", json!({})),
                node("after", "nodes.echo", json!({})),
            ],
            edges: vec![edge("bad1", "after"), edge("bad2", "after")],
        };

        let err = h
            .executor
            .execute_run(request(spec, json!({}), run_id))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Workflow failed at level 0"));
        assert!(message.contains("bad1"));
        assert!(message.contains("bad2"));
        assert!(message.contains("(timeout)"));
        assert!(message.contains("(execution_error)"));

        // Only the two failing siblings dispatched; `after` never ran
        assert_eq!(h.bus.count(), 2);
        assert_eq!(h.journal.status_of(run_id), RunStatus::Failed);
        assert_eq!(h.journal.error_of(run_id), Some(message));
    }

    #[tokio::test]
    async fn cycle_is_rejected_before_any_dispatch() {
        let h = harness(vec![("nodes.echo", Behavior::Echo)]);
        let run_id = Uuid::now_v7();
        h.journal.insert(run_id, RunStatus::Running);

        let spec = FlowSpec {
            nodes: vec![
                node("a", "nodes.echo", json!({})),
                node("b", "nodes.echo", json!({})),
            ],
            edges: vec![edge("a", "b"), edge("b", "a")],
        };

        let err = h
            .executor
            .execute_run(request(spec, json!({}), run_id))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(err.to_string().contains("cycle"));
        assert_eq!(h.bus.count(), 0);
        assert_eq!(h.journal.status_of(run_id), RunStatus::Failed);
    }

    #[tokio::test]
    async fn cancelled_run_stops_at_the_level_boundary() {
        let h = harness(vec![("nodes.echo", Behavior::Echo)]);
        let run_id = Uuid::now_v7();
        h.journal.insert(run_id, RunStatus::Cancelled);

        let spec = FlowSpec {
            nodes: vec![node("a", "nodes.echo", json!({}))],
            edges: vec![],
        };

        let outcome = h
            .executor
            .execute_run(request(spec, json!({}), run_id))
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Cancelled));
        assert_eq!(h.bus.count(), 0);
        assert_eq!(h.journal.status_of(run_id), RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn metrics_cover_every_node_and_the_workflow() {
        let h = harness(vec![("nodes.echo", Behavior::Echo)]);
        let run_id = Uuid::now_v7();
        h.journal.insert(run_id, RunStatus::Running);

        let spec = FlowSpec {
            nodes: vec![
                node("a", "nodes.echo", json!({})),
                node("b", "nodes.echo", json!({})),
            ],
            edges: vec![edge("a", "b")],
        };

        h.executor
            .execute_run(request(spec, json!({}), run_id))
            .await
            .unwrap();

        let events = h.sink.events.lock().unwrap();
        let node_events: Vec<_> = events
            .iter()
            .filter(|e| e.metric_type == MetricType::NodeExecution)
            .collect();
        assert_eq!(node_events.len(), 2);
        assert!(node_events.iter().all(|e| e.status == MetricStatus::Success));
        let workflow_events: Vec<_> = events
            .iter()
            .filter(|e| e.metric_type == MetricType::WorkflowExecution)
            .collect();
        assert_eq!(workflow_events.len(), 1);
        assert_eq!(workflow_events[0].status, MetricStatus::Success);
    }

    #[tokio::test]
    async fn unknown_node_type_fails_with_not_found() {
        let h = harness(vec![]);
        let run_id = Uuid::now_v7();
        h.journal.insert(run_id, RunStatus::Running);

        let spec = FlowSpec {
            nodes: vec![node("a", "nodes.ghost", json!({}))],
            edges: vec![],
        };

        let err = h
            .executor
            .execute_run(request(spec, json!({}), run_id))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("(not_found)"));
        assert_eq!(h.journal.status_of(run_id), RunStatus::Failed);
    }
}
