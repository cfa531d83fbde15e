//! The cleanup engine: preview, batched deletes, audit

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use reflux_contracts::{
    CleanupCounts, CleanupPreview, CleanupReport, CleanupTrigger, RetentionPolicy,
};
use reflux_storage::{CreateCleanupAudit, Database};

use crate::blob::BlobStore;
use crate::error::RetentionError;
use crate::policy::validate_policy;

// Rough per-row estimates for the preview's byte figure; artifacts use their
// recorded sizes instead.
const RUN_ROW_BYTES: i64 = 2048;
const LOG_ROW_BYTES: i64 = 512;
const FLOW_VERSION_ROW_BYTES: i64 = 4096;
const METRIC_ROW_BYTES: i64 = 256;

pub struct RetentionService {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    policy: RetentionPolicy,
    batch_size: i64,
}

impl RetentionService {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        policy: RetentionPolicy,
        batch_size: i64,
    ) -> Result<Self, RetentionError> {
        validate_policy(&policy)?;
        Ok(Self {
            db,
            blobs,
            policy,
            batch_size: batch_size.max(1),
        })
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    fn cutoff(days: u32) -> DateTime<Utc> {
        Utc::now() - Duration::days(i64::from(days))
    }

    /// Read-only counts of everything the current policy would delete.
    pub async fn preview(&self) -> Result<CleanupPreview, RetentionError> {
        let policy = &self.policy;
        let runs_successful = self
            .db
            .count_expired_runs("completed", Self::cutoff(policy.runs.successful_days))
            .await?;
        let runs_failed = self
            .db
            .count_expired_runs("failed", Self::cutoff(policy.runs.failed_days))
            .await?;
        let runs_cancelled = self
            .db
            .count_expired_runs("cancelled", Self::cutoff(policy.runs.cancelled_days))
            .await?;
        let logs_debug = self
            .db
            .count_expired_logs("debug", Self::cutoff(policy.logs.debug_days))
            .await?;
        let logs_info = self
            .db
            .count_expired_logs("info", Self::cutoff(policy.logs.info_days))
            .await?;
        let logs_warn = self
            .db
            .count_expired_logs("warn", Self::cutoff(policy.logs.warn_days))
            .await?;
        let logs_error = self
            .db
            .count_expired_logs("error", Self::cutoff(policy.logs.error_days))
            .await?;
        let artifact_cutoff = Self::cutoff(policy.artifacts.default_days);
        let artifacts = self.db.count_expired_artifacts(artifact_cutoff).await?;
        let artifact_bytes = self.db.sum_expired_artifact_bytes(artifact_cutoff).await?;
        let flow_versions = self
            .db
            .count_prunable_flow_versions(
                i64::from(policy.flow_versions.keep_recent),
                Self::cutoff(policy.flow_versions.min_age_days),
            )
            .await?;
        let metrics = self
            .db
            .count_expired_metrics(Self::cutoff(policy.metrics.raw_days))
            .await?;

        let estimated_bytes = artifact_bytes
            + (runs_successful + runs_failed + runs_cancelled) * RUN_ROW_BYTES
            + (logs_debug + logs_info + logs_warn + logs_error) * LOG_ROW_BYTES
            + flow_versions * FLOW_VERSION_ROW_BYTES
            + metrics * METRIC_ROW_BYTES;

        Ok(CleanupPreview {
            runs_successful,
            runs_failed,
            runs_cancelled,
            logs_debug,
            logs_info,
            logs_warn,
            logs_error,
            artifacts,
            flow_versions,
            metrics,
            estimated_bytes,
        })
    }

    /// Run a cleanup under the cross-instance lock. A second concurrent
    /// invocation fails with [`RetentionError::Locked`].
    pub async fn run_cleanup(
        &self,
        dry_run: bool,
        triggered_by: CleanupTrigger,
    ) -> Result<CleanupReport, RetentionError> {
        let Some(lock) = self.db.try_acquire_cleanup_lock().await? else {
            return Err(RetentionError::Locked);
        };

        let started_at = Utc::now();
        info!(dry_run, trigger = %triggered_by, "cleanup starting");

        let outcome = self.cleanup_under_lock(dry_run).await;

        if let Err(err) = lock.release().await {
            warn!(error = %err, "failed to release cleanup lock");
        }

        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds();

        let (preview, deleted, errors, success) = match outcome {
            Ok((preview, deleted, errors)) => {
                let success = errors.is_empty();
                (preview, deleted, errors, success)
            }
            Err(err) => {
                let report_err = err.to_string();
                self.write_audit(
                    started_at,
                    completed_at,
                    duration_ms,
                    false,
                    dry_run,
                    CleanupPreview::default(),
                    CleanupCounts::default(),
                    vec![report_err],
                    triggered_by,
                )
                .await;
                return Err(err);
            }
        };

        self.write_audit(
            started_at,
            completed_at,
            duration_ms,
            success,
            dry_run,
            preview.clone(),
            deleted.clone(),
            errors.clone(),
            triggered_by,
        )
        .await;

        info!(
            dry_run,
            deleted = deleted.total(),
            duration_ms,
            "cleanup finished"
        );

        Ok(CleanupReport {
            dry_run,
            preview,
            deleted,
            duration_ms,
            errors,
        })
    }

    async fn cleanup_under_lock(
        &self,
        dry_run: bool,
    ) -> Result<(CleanupPreview, CleanupCounts, Vec<String>), RetentionError> {
        let preview = self.preview().await?;
        if dry_run {
            return Ok((preview, CleanupCounts::default(), Vec::new()));
        }

        let mut deleted = CleanupCounts::default();
        let mut errors: Vec<String> = Vec::new();
        let policy = &self.policy;

        match self
            .drain_runs("completed", Self::cutoff(policy.runs.successful_days))
            .await
        {
            Ok(count) => deleted.runs_successful = count,
            Err(err) => errors.push(format!("runs.completed: {err}")),
        }
        match self
            .drain_runs("failed", Self::cutoff(policy.runs.failed_days))
            .await
        {
            Ok(count) => deleted.runs_failed = count,
            Err(err) => errors.push(format!("runs.failed: {err}")),
        }
        match self
            .drain_runs("cancelled", Self::cutoff(policy.runs.cancelled_days))
            .await
        {
            Ok(count) => deleted.runs_cancelled = count,
            Err(err) => errors.push(format!("runs.cancelled: {err}")),
        }

        for (level, days) in [
            ("debug", policy.logs.debug_days),
            ("info", policy.logs.info_days),
            ("warn", policy.logs.warn_days),
            ("error", policy.logs.error_days),
        ] {
            match self.drain_logs(level, Self::cutoff(days)).await {
                Ok(count) => deleted.logs += count,
                Err(err) => errors.push(format!("logs.{level}: {err}")),
            }
        }

        match self
            .drain_artifacts(Self::cutoff(policy.artifacts.default_days), &mut errors)
            .await
        {
            Ok(count) => deleted.artifacts = count,
            Err(err) => errors.push(format!("artifacts: {err}")),
        }

        match self
            .drain_flow_versions(
                i64::from(policy.flow_versions.keep_recent),
                Self::cutoff(policy.flow_versions.min_age_days),
            )
            .await
        {
            Ok(count) => deleted.flow_versions = count,
            Err(err) => errors.push(format!("flow_versions: {err}")),
        }

        match self.drain_metrics(Self::cutoff(policy.metrics.raw_days)).await {
            Ok(count) => deleted.metrics = count,
            Err(err) => errors.push(format!("metrics: {err}")),
        }

        Ok((preview, deleted, errors))
    }

    async fn drain_runs(
        &self,
        status: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RetentionError> {
        let mut total = 0u64;
        loop {
            let ids = self
                .db
                .select_expired_run_ids(status, cutoff, self.batch_size)
                .await?;
            if ids.is_empty() {
                break;
            }
            total += self.db.delete_runs_by_ids(&ids).await?;
        }
        Ok(total)
    }

    async fn drain_logs(&self, level: &str, cutoff: DateTime<Utc>) -> Result<u64, RetentionError> {
        let mut total = 0u64;
        loop {
            let ids = self
                .db
                .select_expired_log_ids(level, cutoff, self.batch_size)
                .await?;
            if ids.is_empty() {
                break;
            }
            total += self.db.delete_logs_by_ids(&ids).await?;
        }
        Ok(total)
    }

    /// Blobs go first, then rows; a blob failure is recorded but the row is
    /// still deleted (an orphaned blob beats a dangling row).
    async fn drain_artifacts(
        &self,
        cutoff: DateTime<Utc>,
        errors: &mut Vec<String>,
    ) -> Result<u64, RetentionError> {
        let mut total = 0u64;
        loop {
            let batch = self
                .db
                .select_expired_artifacts(cutoff, self.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            for artifact in &batch {
                if let Err(err) = self.blobs.delete(&artifact.key).await {
                    warn!(key = %artifact.key, error = %err, "blob delete failed");
                    errors.push(format!("blob {}: {err}", artifact.key));
                }
            }
            let ids: Vec<_> = batch.iter().map(|a| a.id).collect();
            total += self.db.delete_artifacts_by_ids(&ids).await?;
        }
        Ok(total)
    }

    async fn drain_flow_versions(
        &self,
        keep_recent: i64,
        min_age_cutoff: DateTime<Utc>,
    ) -> Result<u64, RetentionError> {
        let mut total = 0u64;
        loop {
            let ids = self
                .db
                .select_prunable_flow_version_ids(keep_recent, min_age_cutoff, self.batch_size)
                .await?;
            if ids.is_empty() {
                break;
            }
            total += self.db.delete_flow_versions_by_ids(&ids).await?;
        }
        Ok(total)
    }

    async fn drain_metrics(&self, cutoff: DateTime<Utc>) -> Result<u64, RetentionError> {
        let mut total = 0u64;
        loop {
            let ids = self
                .db
                .select_expired_metric_ids(cutoff, self.batch_size)
                .await?;
            if ids.is_empty() {
                break;
            }
            total += self.db.delete_metrics_by_ids(&ids).await?;
        }
        Ok(total)
    }

    /// Audit failures are logged, never propagated: the cleanup's outcome is
    /// already decided by the data deletion.
    #[allow(clippy::too_many_arguments)]
    async fn write_audit(
        &self,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        duration_ms: i64,
        success: bool,
        dry_run: bool,
        preview: CleanupPreview,
        deleted: CleanupCounts,
        errors: Vec<String>,
        triggered_by: CleanupTrigger,
    ) {
        let policy_snapshot = serde_json::to_value(&self.policy).unwrap_or_default();
        let result = self
            .db
            .insert_cleanup_audit(CreateCleanupAudit {
                started_at,
                completed_at,
                duration_ms,
                success,
                dry_run,
                retention_policy: policy_snapshot,
                preview,
                deleted,
                errors,
                triggered_by: triggered_by.to_string(),
            })
            .await;
        if let Err(err) = result {
            warn!(error = %err, "failed to write cleanup audit row");
        }
    }
}
