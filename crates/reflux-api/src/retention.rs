// Retention admin HTTP routes

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use reflux_contracts::{
    CleanupAudit, CleanupPreview, CleanupReport, CleanupTrigger, RetentionPolicy,
};
use reflux_retention::{RetentionError, RetentionService};
use reflux_storage::Database;

use crate::error::ApiError;

/// App state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub service: Arc<RetentionService>,
}

/// Request body for manual cleanup
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    50
}

/// One table's storage pressure
#[derive(Debug, Serialize, ToSchema)]
pub struct TableStatsBody {
    pub table: String,
    pub rows: i64,
    pub oldest: Option<chrono::DateTime<chrono::Utc>>,
    pub total_bytes: i64,
}

/// Execution counts over the trailing week, per metric type and status
#[derive(Debug, Serialize, ToSchema)]
pub struct MetricCountBody {
    pub metric_type: String,
    pub status: String,
    pub count: i64,
}

/// Storage pressure plus recent execution volume
#[derive(Debug, Serialize, ToSchema)]
pub struct RetentionStatsBody {
    pub tables: Vec<TableStatsBody>,
    pub executions_last_7d: Vec<MetricCountBody>,
}

/// Create retention admin routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/admin/retention/policy", get(get_policy))
        .route("/api/admin/retention/preview", get(get_preview))
        .route("/api/admin/retention/history", get(get_history))
        .route("/api/admin/retention/latest", get(get_latest))
        .route("/api/admin/retention/stats", get(get_stats))
        .route("/api/admin/retention/cleanup", post(run_cleanup))
        .with_state(state)
}

fn map_retention_error(err: RetentionError) -> ApiError {
    match err {
        RetentionError::Locked => ApiError::conflict(err.to_string()),
        RetentionError::Policy(msg) => ApiError::validation(msg),
        RetentionError::Storage(msg) => ApiError::unavailable(msg),
    }
}

/// GET /api/admin/retention/policy - The active policy
#[utoipa::path(
    get,
    path = "/api/admin/retention/policy",
    responses((status = 200, description = "Active policy", body = RetentionPolicy)),
    tag = "retention"
)]
pub async fn get_policy(State(state): State<AppState>) -> Json<RetentionPolicy> {
    Json(state.service.policy().clone())
}

/// GET /api/admin/retention/preview - What a cleanup would remove
#[utoipa::path(
    get,
    path = "/api/admin/retention/preview",
    responses((status = 200, description = "Counts per category", body = CleanupPreview)),
    tag = "retention"
)]
pub async fn get_preview(
    State(state): State<AppState>,
) -> Result<Json<CleanupPreview>, ApiError> {
    let preview = state
        .service
        .preview()
        .await
        .map_err(map_retention_error)?;
    Ok(Json(preview))
}

/// GET /api/admin/retention/history - Past cleanup audits
#[utoipa::path(
    get,
    path = "/api/admin/retention/history",
    params(("limit" = Option<i64>, Query, description = "Max audits (default 50)")),
    responses((status = 200, description = "Audit rows", body = Vec<CleanupAudit>)),
    tag = "retention"
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<CleanupAudit>>, ApiError> {
    let rows = state
        .db
        .list_cleanup_audits(params.limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /api/admin/retention/latest - Most recent audit
#[utoipa::path(
    get,
    path = "/api/admin/retention/latest",
    responses(
        (status = 200, description = "Latest audit", body = CleanupAudit),
        (status = 404, description = "No cleanup has run yet")
    ),
    tag = "retention"
)]
pub async fn get_latest(State(state): State<AppState>) -> Result<Json<CleanupAudit>, ApiError> {
    let row = state
        .db
        .latest_cleanup_audit()
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("no cleanup has run yet"))?;
    Ok(Json(row.into()))
}

/// GET /api/admin/retention/stats - Table sizes, oldest rows, recent volume
#[utoipa::path(
    get,
    path = "/api/admin/retention/stats",
    responses((status = 200, description = "Storage stats", body = RetentionStatsBody)),
    tag = "retention"
)]
pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<RetentionStatsBody>, ApiError> {
    let tables = state
        .db
        .retention_table_stats()
        .await
        .map_err(ApiError::internal)?
        .into_iter()
        .map(|s| TableStatsBody {
            table: s.table_name,
            rows: s.row_count,
            oldest: s.oldest,
            total_bytes: s.total_bytes,
        })
        .collect();

    let since = chrono::Utc::now() - chrono::Duration::days(7);
    let executions_last_7d = state
        .db
        .metric_counts_since(since)
        .await
        .map_err(ApiError::internal)?
        .into_iter()
        .map(|(metric_type, status, count)| MetricCountBody {
            metric_type,
            status,
            count,
        })
        .collect();

    Ok(Json(RetentionStatsBody {
        tables,
        executions_last_7d,
    }))
}

/// POST /api/admin/retention/cleanup - Manual cleanup; 409 when locked
#[utoipa::path(
    post,
    path = "/api/admin/retention/cleanup",
    request_body = CleanupRequest,
    responses(
        (status = 200, description = "Cleanup report", body = CleanupReport),
        (status = 409, description = "Another instance is cleaning up")
    ),
    tag = "retention"
)]
pub async fn run_cleanup(
    State(state): State<AppState>,
    body: Option<Json<CleanupRequest>>,
) -> Result<(StatusCode, Json<CleanupReport>), ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let report = state
        .service
        .run_cleanup(request.dry_run, CleanupTrigger::Manual)
        .await
        .map_err(map_retention_error)?;
    Ok((StatusCode::OK, Json(report)))
}
