// Repository layer for database operations
// Terminal run transitions are status-guarded so retries stay idempotent.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::*;

/// Bump the patch component of a semver string; falls back to the input with
/// a `.1` suffix when it does not parse.
fn bump_patch(version: &str) -> String {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() == 3 {
        if let (Ok(major), Ok(minor), Ok(patch)) = (
            parts[0].parse::<u64>(),
            parts[1].parse::<u64>(),
            parts[2].parse::<u64>(),
        ) {
            return format!("{major}.{minor}.{}", patch + 1);
        }
    }
    format!("{version}.1")
}

const FLOW_COLUMNS: &str =
    "id, name, version, description, spec, tags, is_active, created_at, updated_at";
const FLOW_VERSION_COLUMNS: &str = "id, flow_id, version, spec, created_at, created_by, changelog";
const RUN_COLUMNS: &str =
    "id, flow_id, flow_version, status, inputs, outputs, error, started_at, completed_at, duration_ms";
const RUN_LOG_COLUMNS: &str = "id, run_id, step_id, timestamp, level, message, data";
const ARTIFACT_COLUMNS: &str =
    "id, run_id, step_id, key, size_bytes, content_type, storage_backend, etag, created_at, expires_at";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // ============================================
    // Flows
    // ============================================

    pub async fn create_flow(&self, input: CreateFlow) -> Result<FlowRow> {
        let row = sqlx::query_as::<_, FlowRow>(&format!(
            r#"
            INSERT INTO flows (id, name, version, description, spec, tags, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {FLOW_COLUMNS}
            "#,
        ))
        .bind(Uuid::now_v7())
        .bind(&input.name)
        .bind(input.version.as_deref().unwrap_or("1.0.0"))
        .bind(&input.description)
        .bind(&input.spec)
        .bind(&input.tags)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_flow(&self, id: Uuid) -> Result<Option<FlowRow>> {
        let row = sqlx::query_as::<_, FlowRow>(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE id = $1",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_flows(
        &self,
        active_only: bool,
        tag: Option<&str>,
    ) -> Result<Vec<FlowRow>> {
        let rows = sqlx::query_as::<_, FlowRow>(&format!(
            r#"
            SELECT {FLOW_COLUMNS}
            FROM flows
            WHERE (NOT $1 OR is_active)
              AND ($2::text IS NULL OR $2 = ANY(tags))
            ORDER BY created_at DESC
            "#,
        ))
        .bind(active_only)
        .bind(tag)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Every active flow, for webhook matching.
    pub async fn list_active_flows(&self) -> Result<Vec<FlowRow>> {
        self.list_flows(true, None).await
    }

    /// Versioned update: the prior state is snapshotted into `flow_versions`
    /// in the same transaction that overwrites the flow.
    pub async fn update_flow(&self, id: Uuid, input: UpdateFlow) -> Result<Option<FlowRow>> {
        let mut tx = self.pool.begin().await?;

        let Some(current) = sqlx::query_as::<_, FlowRow>(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE id = $1 FOR UPDATE",
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO flow_versions (id, flow_id, version, spec, created_by, changelog)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(current.id)
        .bind(&current.version)
        .bind(&current.spec)
        .bind(&input.updated_by)
        .bind(&input.changelog)
        .execute(&mut *tx)
        .await?;

        let new_version = input
            .version
            .clone()
            .unwrap_or_else(|| bump_patch(&current.version));

        let row = sqlx::query_as::<_, FlowRow>(&format!(
            r#"
            UPDATE flows
            SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                spec = COALESCE($4, spec),
                tags = COALESCE($5, tags),
                is_active = COALESCE($6, is_active),
                version = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {FLOW_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.spec)
        .bind(&input.tags)
        .bind(input.is_active)
        .bind(&new_version)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    pub async fn delete_flow(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============================================
    // Flow versions
    // ============================================

    pub async fn list_flow_versions(&self, flow_id: Uuid) -> Result<Vec<FlowVersionRow>> {
        let rows = sqlx::query_as::<_, FlowVersionRow>(&format!(
            r#"
            SELECT {FLOW_VERSION_COLUMNS}
            FROM flow_versions
            WHERE flow_id = $1
            ORDER BY created_at DESC
            "#,
        ))
        .bind(flow_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_flow_version(
        &self,
        flow_id: Uuid,
        version_id: Uuid,
    ) -> Result<Option<FlowVersionRow>> {
        let row = sqlx::query_as::<_, FlowVersionRow>(&format!(
            "SELECT {FLOW_VERSION_COLUMNS} FROM flow_versions WHERE id = $1 AND flow_id = $2",
        ))
        .bind(version_id)
        .bind(flow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Roll a flow back to a prior version. Writes two version rows: one
    /// capturing the pre-rollback state, one documenting the restored state.
    pub async fn rollback_flow(
        &self,
        flow_id: Uuid,
        version_id: Uuid,
        rolled_back_by: Option<&str>,
    ) -> Result<Option<FlowRow>> {
        let mut tx = self.pool.begin().await?;

        let Some(current) = sqlx::query_as::<_, FlowRow>(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE id = $1 FOR UPDATE",
        ))
        .bind(flow_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let Some(target) = sqlx::query_as::<_, FlowVersionRow>(&format!(
            "SELECT {FLOW_VERSION_COLUMNS} FROM flow_versions WHERE id = $1 AND flow_id = $2",
        ))
        .bind(version_id)
        .bind(flow_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO flow_versions (id, flow_id, version, spec, created_by, changelog)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(flow_id)
        .bind(&current.version)
        .bind(&current.spec)
        .bind(rolled_back_by)
        .bind(format!("Pre-rollback snapshot of {}", current.version))
        .execute(&mut *tx)
        .await?;

        let new_version = bump_patch(&current.version);

        let row = sqlx::query_as::<_, FlowRow>(&format!(
            r#"
            UPDATE flows
            SET spec = $2, version = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {FLOW_COLUMNS}
            "#,
        ))
        .bind(flow_id)
        .bind(&target.spec)
        .bind(&new_version)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO flow_versions (id, flow_id, version, spec, created_by, changelog)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(flow_id)
        .bind(&new_version)
        .bind(&target.spec)
        .bind(rolled_back_by)
        .bind(format!("Rolled back to version {}", target.version))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    // ============================================
    // Runs
    // ============================================

    pub async fn create_run(&self, input: CreateRun) -> Result<RunRow> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            r#"
            INSERT INTO runs (id, flow_id, flow_version, status, inputs)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING {RUN_COLUMNS}
            "#,
        ))
        .bind(Uuid::now_v7())
        .bind(input.flow_id)
        .bind(&input.flow_version)
        .bind(&input.inputs)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_run(&self, id: Uuid) -> Result<Option<RunRow>> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE id = $1",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_runs(
        &self,
        status: Option<&str>,
        flow_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RunRow>> {
        let limit = limit.clamp(1, 1000);
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM runs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR flow_id = $2)
            ORDER BY started_at DESC
            LIMIT $3 OFFSET $4
            "#,
        ))
        .bind(status)
        .bind(flow_id)
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// `pending → running` on engine acceptance.
    pub async fn mark_run_running(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET status = 'running'
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Idempotent completion: a second call is a no-op, and `duration_ms` is
    /// computed at the store so it is written exactly once.
    pub async fn mark_run_completed(
        &self,
        id: Uuid,
        outputs: &serde_json::Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = 'completed',
                outputs = $2,
                completed_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT
            WHERE id = $1 AND status != 'completed'
            "#,
        )
        .bind(id)
        .bind(outputs)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Idempotent failure: completed and already-failed runs are untouched.
    pub async fn mark_run_failed(&self, id: Uuid, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = 'failed',
                error = $2,
                completed_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT
            WHERE id = $1 AND status != 'failed' AND status != 'completed'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// External cancellation of a pending or running run.
    pub async fn mark_run_cancelled(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = 'cancelled',
                completed_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT
            WHERE id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============================================
    // Run logs
    // ============================================

    /// Batch insert, used by the buffered run logger.
    pub async fn insert_run_logs(&self, entries: &[CreateRunLog]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO run_logs (id, run_id, step_id, timestamp, level, message, data) ",
        );
        builder.push_values(entries, |mut b, entry| {
            b.push_bind(Uuid::now_v7())
                .push_bind(entry.run_id)
                .push_bind(&entry.step_id)
                .push_bind(entry.timestamp)
                .push_bind(entry.level.to_string())
                .push_bind(&entry.message)
                .push_bind(&entry.data);
        });

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn list_run_logs(
        &self,
        run_id: Uuid,
        level: Option<&str>,
        limit: i64,
    ) -> Result<Vec<RunLogRow>> {
        let limit = limit.clamp(1, 10_000);
        let rows = sqlx::query_as::<_, RunLogRow>(&format!(
            r#"
            SELECT {RUN_LOG_COLUMNS}
            FROM run_logs
            WHERE run_id = $1
              AND ($2::text IS NULL OR level = $2)
            ORDER BY timestamp ASC
            LIMIT $3
            "#,
        ))
        .bind(run_id)
        .bind(level)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Artifacts (metadata index; blobs live elsewhere)
    // ============================================

    pub async fn create_artifact(&self, input: CreateArtifact) -> Result<ArtifactRow> {
        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            r#"
            INSERT INTO artifacts (id, run_id, step_id, key, size_bytes, content_type, storage_backend, etag, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ARTIFACT_COLUMNS}
            "#,
        ))
        .bind(Uuid::now_v7())
        .bind(input.run_id)
        .bind(&input.step_id)
        .bind(&input.key)
        .bind(input.size_bytes)
        .bind(&input.content_type)
        .bind(&input.storage_backend)
        .bind(&input.etag)
        .bind(input.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_artifact_by_key(&self, key: &str) -> Result<Option<ArtifactRow>> {
        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE key = $1",
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_artifacts_for_run(&self, run_id: Uuid) -> Result<Vec<ArtifactRow>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE run_id = $1 ORDER BY created_at ASC",
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Metrics
    // ============================================

    pub async fn insert_metric(&self, input: CreateMetric) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metrics (id, metric_type, flow_id, run_id, node_id, duration_ms, status, error_type, tags, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.metric_type)
        .bind(input.flow_id)
        .bind(input.run_id)
        .bind(&input.node_id)
        .bind(input.duration_ms)
        .bind(&input.status)
        .bind(&input.error_type)
        .bind(&input.tags)
        .bind(&input.metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Success/failure counts per metric type since a cutoff, for dashboards.
    pub async fn metric_counts_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, String, i64)>> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            r#"
            SELECT metric_type, status, COUNT(*)
            FROM metrics
            WHERE timestamp >= $1
            GROUP BY metric_type, status
            ORDER BY metric_type, status
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
