// Retention scan and delete queries
// All deletes are batched (SELECT ids LIMIT n, then DELETE ... = ANY) so no
// long transaction ever spans a production table.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use uuid::Uuid;

use crate::models::{CleanupAuditRow, CreateCleanupAudit};
use crate::repositories::Database;

/// Fixed advisory-lock key for cleanup; shared by every API instance.
pub const CLEANUP_LOCK_ID: i64 = 0x5245_464c; // "REFL"

/// A held cross-instance cleanup lock.
///
/// Session-scoped on a dedicated pooled connection; [`CleanupLock::release`]
/// must run before the connection returns to the pool, otherwise the lock
/// would leak with the pooled session.
pub struct CleanupLock {
    conn: PoolConnection<Postgres>,
}

impl CleanupLock {
    pub async fn release(mut self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(CLEANUP_LOCK_ID)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

/// An expired artifact row plus the key needed to delete its blob first.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExpiredArtifact {
    pub id: Uuid,
    pub key: String,
    pub storage_backend: String,
}

/// Row count, oldest timestamp, and on-disk size for one table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TableStats {
    pub table_name: String,
    pub row_count: i64,
    pub oldest: Option<DateTime<Utc>>,
    pub total_bytes: i64,
}

impl Database {
    // ============================================
    // Cross-instance lock
    // ============================================

    /// Try to take the cleanup lock; `None` means another instance holds it.
    pub async fn try_acquire_cleanup_lock(&self) -> Result<Option<CleanupLock>> {
        let mut conn = self.pool().acquire().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(CLEANUP_LOCK_ID)
            .fetch_one(&mut *conn)
            .await?;
        if locked {
            Ok(Some(CleanupLock { conn }))
        } else {
            Ok(None)
        }
    }

    // ============================================
    // Preview counts
    // ============================================

    pub async fn count_expired_runs(
        &self,
        status: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM runs WHERE status = $1 AND completed_at < $2",
        )
        .bind(status)
        .bind(cutoff)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    pub async fn count_expired_logs(&self, level: &str, cutoff: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM run_logs WHERE level = $1 AND timestamp < $2",
        )
        .bind(level)
        .bind(cutoff)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    pub async fn count_expired_artifacts(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM artifacts
            WHERE (expires_at IS NOT NULL AND expires_at < NOW())
               OR (expires_at IS NULL AND created_at < $1)
            "#,
        )
        .bind(cutoff)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// Sum of expired artifact sizes, for the preview's byte estimate.
    pub async fn sum_expired_artifact_bytes(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(size_bytes)::BIGINT FROM artifacts
            WHERE (expires_at IS NOT NULL AND expires_at < NOW())
               OR (expires_at IS NULL AND created_at < $1)
            "#,
        )
        .bind(cutoff)
        .fetch_one(self.pool())
        .await?;
        Ok(sum.unwrap_or(0))
    }

    pub async fn count_prunable_flow_versions(
        &self,
        keep_recent: i64,
        min_age_cutoff: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM (
                SELECT id, created_at,
                       ROW_NUMBER() OVER (PARTITION BY flow_id ORDER BY created_at DESC) AS rank
                FROM flow_versions
            ) ranked
            WHERE rank > $1 AND created_at < $2
            "#,
        )
        .bind(keep_recent)
        .bind(min_age_cutoff)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    pub async fn count_expired_metrics(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM metrics WHERE timestamp < $1")
                .bind(cutoff)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    // ============================================
    // Batched deletes
    // ============================================

    pub async fn select_expired_run_ids(
        &self,
        status: &str,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM runs
            WHERE status = $1 AND completed_at < $2
            ORDER BY completed_at ASC
            LIMIT $3
            "#,
        )
        .bind(status)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    /// Cascades to the run's logs, artifact rows, and metrics.
    pub async fn delete_runs_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM runs WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn select_expired_log_ids(
        &self,
        level: &str,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM run_logs
            WHERE level = $1 AND timestamp < $2
            ORDER BY timestamp ASC
            LIMIT $3
            "#,
        )
        .bind(level)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    pub async fn delete_logs_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM run_logs WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn select_expired_artifacts(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExpiredArtifact>> {
        let rows = sqlx::query_as::<_, ExpiredArtifact>(
            r#"
            SELECT id, key, storage_backend FROM artifacts
            WHERE (expires_at IS NOT NULL AND expires_at < NOW())
               OR (expires_at IS NULL AND created_at < $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn delete_artifacts_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM artifacts WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Rank versions per flow newest-first; rows ranked past `keep_recent`
    /// and older than the min-age cutoff are prunable.
    pub async fn select_prunable_flow_version_ids(
        &self,
        keep_recent: i64,
        min_age_cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM (
                SELECT id, created_at,
                       ROW_NUMBER() OVER (PARTITION BY flow_id ORDER BY created_at DESC) AS rank
                FROM flow_versions
            ) ranked
            WHERE rank > $1 AND created_at < $2
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(keep_recent)
        .bind(min_age_cutoff)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    pub async fn delete_flow_versions_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM flow_versions WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn select_expired_metric_ids(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM metrics
            WHERE timestamp < $1
            ORDER BY timestamp ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    pub async fn delete_metrics_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metrics WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    // ============================================
    // Cleanup audit
    // ============================================

    pub async fn insert_cleanup_audit(&self, input: CreateCleanupAudit) -> Result<CleanupAuditRow> {
        let row = sqlx::query_as::<_, CleanupAuditRow>(
            r#"
            INSERT INTO cleanup_audit
                (id, started_at, completed_at, duration_ms, success, dry_run,
                 retention_policy, preview, deleted, errors, triggered_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, started_at, completed_at, duration_ms, success, dry_run,
                      retention_policy, preview, deleted, errors, triggered_by
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.started_at)
        .bind(input.completed_at)
        .bind(input.duration_ms)
        .bind(input.success)
        .bind(input.dry_run)
        .bind(&input.retention_policy)
        .bind(serde_json::to_value(&input.preview)?)
        .bind(serde_json::to_value(&input.deleted)?)
        .bind(&input.errors)
        .bind(&input.triggered_by)
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    pub async fn list_cleanup_audits(&self, limit: i64) -> Result<Vec<CleanupAuditRow>> {
        let rows = sqlx::query_as::<_, CleanupAuditRow>(
            r#"
            SELECT id, started_at, completed_at, duration_ms, success, dry_run,
                   retention_policy, preview, deleted, errors, triggered_by
            FROM cleanup_audit
            ORDER BY started_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 500))
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn latest_cleanup_audit(&self) -> Result<Option<CleanupAuditRow>> {
        let row = sqlx::query_as::<_, CleanupAuditRow>(
            r#"
            SELECT id, started_at, completed_at, duration_ms, success, dry_run,
                   retention_policy, preview, deleted, errors, triggered_by
            FROM cleanup_audit
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    // ============================================
    // Storage stats
    // ============================================

    /// Row counts, oldest rows, and relation sizes for the retained tables.
    pub async fn retention_table_stats(&self) -> Result<Vec<TableStats>> {
        let rows = sqlx::query_as::<_, TableStats>(
            r#"
            SELECT 'runs' AS table_name, COUNT(*) AS row_count,
                   MIN(started_at) AS oldest,
                   pg_total_relation_size('runs') AS total_bytes
            FROM runs
            UNION ALL
            SELECT 'run_logs', COUNT(*), MIN(timestamp),
                   pg_total_relation_size('run_logs')
            FROM run_logs
            UNION ALL
            SELECT 'artifacts', COUNT(*), MIN(created_at),
                   pg_total_relation_size('artifacts')
            FROM artifacts
            UNION ALL
            SELECT 'flow_versions', COUNT(*), MIN(created_at),
                   pg_total_relation_size('flow_versions')
            FROM flow_versions
            UNION ALL
            SELECT 'metrics', COUNT(*), MIN(timestamp),
                   pg_total_relation_size('metrics')
            FROM metrics
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
