//! Retention service
//!
//! Policy-driven garbage collection for runs, logs, artifacts, flow versions,
//! and metrics. Deletes run in bounded batches, never under a long
//! transaction, and only while holding the cross-instance advisory lock.
//! Every cleanup — dry-run or real — leaves a durable audit row.

pub mod blob;
pub mod error;
pub mod policy;
pub mod scheduler;
pub mod service;

pub use blob::{BlobStore, NullBlobStore};
pub use error::RetentionError;
pub use policy::{
    batch_size_from_env, default_policy, load_policy_from_env, validate_policy,
    DEFAULT_BATCH_SIZE,
};
pub use scheduler::{interval_from_env, spawn_retention_scheduler};
pub use service::RetentionService;
