//! Artifact blob store seam
//!
//! The metadata index lives in Postgres; the bytes live behind this trait.
//! Concrete backends (local FS, S3) plug in at startup.

use async_trait::async_trait;

/// Delete-capable view of the artifact blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Backend for deployments that keep no artifact blobs; deletes succeed
/// trivially so metadata cleanup can proceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBlobStore;

#[async_trait]
impl BlobStore for NullBlobStore {
    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        tracing::debug!(key = %key, "no blob backend configured, nothing to delete");
        Ok(())
    }
}
