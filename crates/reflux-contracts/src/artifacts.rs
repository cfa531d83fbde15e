// Artifact metadata DTOs
// The blob itself lives in an external store; this is its index row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Artifact {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: String,
    /// Globally unique key into the blob store
    pub key: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub storage_backend: String,
    pub etag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
