//! Durable DAG execution engine
//!
//! Takes a validated flow spec, computes a level schedule (Kahn layering over
//! in-degrees), and executes each level with full intra-level parallelism:
//! template resolution over node params, dispatch through the node bus,
//! failure aggregation per level, and durable status transitions through the
//! [`RunJournal`].
//!
//! The engine owns failure transitions; the caller owns `pending → running`
//! acceptance and the `completed` terminal write.

pub mod context;
pub mod dag;
mod error;
mod executor;
pub mod template;
pub mod traits;

pub use context::{ExecutionContext, NodeResult};
pub use error::EngineError;
pub use executor::{ExecuteRequest, ExecutionOutcome, ExecutorConfig, FlowExecutor, RunOutput};
pub use traits::{
    JournalError, LogEntry, MetricEvent, MetricSink, NoopMetricSink, NoopStepLogger, RunJournal,
    StepLogger,
};
