//! Scheduled retention: a durable background task that runs cleanup daily

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use reflux_contracts::CleanupTrigger;

use crate::error::RetentionError;
use crate::service::RetentionService;

const DEFAULT_INTERVAL_HOURS: u64 = 24;

/// Interval between scheduled cleanups; `RETENTION_INTERVAL_HOURS` overrides
/// the 24 h default (useful for staging).
pub fn interval_from_env() -> Duration {
    let hours = std::env::var("RETENTION_INTERVAL_HOURS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|h| *h > 0)
        .unwrap_or(DEFAULT_INTERVAL_HOURS);
    Duration::from_secs(hours * 3600)
}

/// Spawn the scheduler loop: sleep, clean, repeat. Failures (including lock
/// contention with a manual cleanup) are logged and the loop continues.
pub fn spawn_retention_scheduler(
    service: Arc<RetentionService>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "retention scheduler started");
        loop {
            tokio::time::sleep(interval).await;
            match service.run_cleanup(false, CleanupTrigger::Scheduled).await {
                Ok(report) => {
                    info!(
                        deleted = report.deleted.total(),
                        duration_ms = report.duration_ms,
                        errors = report.errors.len(),
                        "scheduled cleanup finished"
                    );
                }
                Err(RetentionError::Locked) => {
                    info!("scheduled cleanup skipped, another instance holds the lock");
                }
                Err(err) => {
                    error!(error = %err, "scheduled cleanup failed");
                }
            }
        }
    })
}
