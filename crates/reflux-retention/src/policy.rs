//! Retention policy defaults, env overrides, and bounds validation

use reflux_contracts::{
    ArtifactRetention, FlowVersionRetention, LogRetention, MetricRetention, RetentionPolicy,
    RunRetention,
};

use crate::error::RetentionError;

/// Default delete batch size; env-overridable via `RETENTION_BATCH_SIZE`.
pub const DEFAULT_BATCH_SIZE: i64 = 1000;

/// The documented defaults.
pub fn default_policy() -> RetentionPolicy {
    RetentionPolicy {
        runs: RunRetention {
            successful_days: 30,
            failed_days: 90,
            cancelled_days: 14,
        },
        logs: LogRetention {
            debug_days: 7,
            info_days: 30,
            warn_days: 60,
            error_days: 90,
        },
        artifacts: ArtifactRetention { default_days: 30 },
        flow_versions: FlowVersionRetention {
            keep_recent: 10,
            min_age_days: 7,
        },
        metrics: MetricRetention { raw_days: 30 },
    }
}

fn env_u32(name: &str) -> Result<Option<u32>, RetentionError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| RetentionError::Policy(format!("{name} must be an integer, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}

/// Defaults overridden by `RETENTION_*` env vars, then validated; any value
/// outside its bounds rejects the whole policy.
pub fn load_policy_from_env() -> Result<RetentionPolicy, RetentionError> {
    let mut policy = default_policy();

    if let Some(v) = env_u32("RETENTION_RUNS_SUCCESSFUL_DAYS")? {
        policy.runs.successful_days = v;
    }
    if let Some(v) = env_u32("RETENTION_RUNS_FAILED_DAYS")? {
        policy.runs.failed_days = v;
    }
    if let Some(v) = env_u32("RETENTION_RUNS_CANCELLED_DAYS")? {
        policy.runs.cancelled_days = v;
    }
    if let Some(v) = env_u32("RETENTION_LOGS_DEBUG_DAYS")? {
        policy.logs.debug_days = v;
    }
    if let Some(v) = env_u32("RETENTION_LOGS_INFO_DAYS")? {
        policy.logs.info_days = v;
    }
    if let Some(v) = env_u32("RETENTION_LOGS_WARN_DAYS")? {
        policy.logs.warn_days = v;
    }
    if let Some(v) = env_u32("RETENTION_LOGS_ERROR_DAYS")? {
        policy.logs.error_days = v;
    }
    if let Some(v) = env_u32("RETENTION_ARTIFACTS_DAYS")? {
        policy.artifacts.default_days = v;
    }
    if let Some(v) = env_u32("RETENTION_FLOW_VERSIONS_KEEP_RECENT")? {
        policy.flow_versions.keep_recent = v;
    }
    if let Some(v) = env_u32("RETENTION_FLOW_VERSIONS_MIN_AGE_DAYS")? {
        policy.flow_versions.min_age_days = v;
    }
    if let Some(v) = env_u32("RETENTION_METRICS_RAW_DAYS")? {
        policy.metrics.raw_days = v;
    }

    validate_policy(&policy)?;
    Ok(policy)
}

fn check(name: &str, value: u32, min: u32, max: u32) -> Result<(), RetentionError> {
    if value < min || value > max {
        return Err(RetentionError::Policy(format!(
            "{name} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

/// Bounds from the retention table: run/artifact/metric ages 1-3650 days,
/// log ages and version min-age 1-365 days, keep-recent 1-100 versions.
pub fn validate_policy(policy: &RetentionPolicy) -> Result<(), RetentionError> {
    check("runs.successful_days", policy.runs.successful_days, 1, 3650)?;
    check("runs.failed_days", policy.runs.failed_days, 1, 3650)?;
    check("runs.cancelled_days", policy.runs.cancelled_days, 1, 3650)?;
    check("logs.debug_days", policy.logs.debug_days, 1, 365)?;
    check("logs.info_days", policy.logs.info_days, 1, 365)?;
    check("logs.warn_days", policy.logs.warn_days, 1, 365)?;
    check("logs.error_days", policy.logs.error_days, 1, 365)?;
    check("artifacts.default_days", policy.artifacts.default_days, 1, 3650)?;
    check("flow_versions.keep_recent", policy.flow_versions.keep_recent, 1, 100)?;
    check("flow_versions.min_age_days", policy.flow_versions.min_age_days, 1, 365)?;
    check("metrics.raw_days", policy.metrics.raw_days, 1, 3650)?;
    Ok(())
}

/// `RETENTION_BATCH_SIZE`, defaulting to 1000 and clamped to a sane range.
pub fn batch_size_from_env() -> i64 {
    std::env::var("RETENTION_BATCH_SIZE")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .map(|v| v.clamp(10, 10_000))
        .unwrap_or(DEFAULT_BATCH_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let policy = default_policy();
        assert_eq!(policy.runs.successful_days, 30);
        assert_eq!(policy.runs.failed_days, 90);
        assert_eq!(policy.runs.cancelled_days, 14);
        assert_eq!(policy.logs.debug_days, 7);
        assert_eq!(policy.logs.error_days, 90);
        assert_eq!(policy.artifacts.default_days, 30);
        assert_eq!(policy.flow_versions.keep_recent, 10);
        assert_eq!(policy.flow_versions.min_age_days, 7);
        assert_eq!(policy.metrics.raw_days, 30);
        assert!(validate_policy(&policy).is_ok());
    }

    #[test]
    fn out_of_bounds_values_reject_the_policy() {
        let mut policy = default_policy();
        policy.runs.successful_days = 0;
        assert!(validate_policy(&policy).is_err());

        let mut policy = default_policy();
        policy.runs.successful_days = 4000;
        assert!(validate_policy(&policy).is_err());

        let mut policy = default_policy();
        policy.logs.debug_days = 366;
        assert!(validate_policy(&policy).is_err());

        let mut policy = default_policy();
        policy.flow_versions.keep_recent = 101;
        assert!(validate_policy(&policy).is_err());
    }

    #[test]
    fn boundary_values_are_accepted() {
        let mut policy = default_policy();
        policy.runs.successful_days = 1;
        policy.runs.failed_days = 3650;
        policy.logs.info_days = 365;
        policy.flow_versions.keep_recent = 100;
        assert!(validate_policy(&policy).is_ok());
    }
}
