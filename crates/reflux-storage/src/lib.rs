// Postgres storage layer with sqlx

pub mod adapters;
pub mod models;
pub mod repositories;
pub mod retention_store;
pub mod run_logger;

pub use adapters::{DbMetricSink, DbRunJournal};
pub use models::*;
pub use repositories::Database;
pub use retention_store::{CleanupLock, ExpiredArtifact, TableStats, CLEANUP_LOCK_ID};
pub use run_logger::{LogWriter, RunLogger, RunLoggerConfig};
