// Run read and cancel HTTP routes

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use reflux_contracts::{Run, RunLog, RunWithLogs};
use reflux_storage::Database;

use crate::error::ApiError;
use crate::runner::FlowRunner;

/// App state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub runner: Arc<dyn FlowRunner>,
}

/// Query parameters for listing runs
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListRunsParams {
    pub status: Option<String>,
    pub flow_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// Query parameters for run logs
#[derive(Debug, Deserialize, ToSchema)]
pub struct LogsParams {
    pub level: Option<String>,
    #[serde(default = "default_log_limit")]
    pub limit: i64,
}

fn default_log_limit() -> i64 {
    1000
}

/// Create run routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/runs", get(list_runs))
        .route("/api/runs/:id", get(get_run))
        .route("/api/runs/:id/logs", get(get_run_logs))
        .route("/api/runs/:id/with-logs", get(get_run_with_logs))
        .route("/api/runs/:id/cancel", patch(cancel_run))
        .with_state(state)
}

/// GET /api/runs - List runs (limit <= 1000)
#[utoipa::path(
    get,
    path = "/api/runs",
    params(
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("flow_id" = Option<Uuid>, Query, description = "Filter by flow"),
        ("limit" = Option<i64>, Query, description = "Max results (<= 1000)"),
        ("offset" = Option<i64>, Query, description = "Pagination offset")
    ),
    responses((status = 200, description = "List of runs", body = Vec<Run>)),
    tag = "runs"
)]
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<ListRunsParams>,
) -> Result<Json<Vec<Run>>, ApiError> {
    let rows = state
        .db
        .list_runs(
            params.status.as_deref(),
            params.flow_id,
            params.limit,
            params.offset,
        )
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /api/runs/:id - One run
#[utoipa::path(
    get,
    path = "/api/runs/{id}",
    responses(
        (status = 200, description = "The run", body = Run),
        (status = 404, description = "No such run")
    ),
    tag = "runs"
)]
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Run>, ApiError> {
    let row = state
        .db
        .get_run(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("run {id} not found")))?;
    Ok(Json(row.into()))
}

/// GET /api/runs/:id/logs - Step logs (limit <= 10000)
#[utoipa::path(
    get,
    path = "/api/runs/{id}/logs",
    params(
        ("level" = Option<String>, Query, description = "Filter by level"),
        ("limit" = Option<i64>, Query, description = "Max results (<= 10000)")
    ),
    responses(
        (status = 200, description = "Log lines", body = Vec<RunLog>),
        (status = 404, description = "No such run")
    ),
    tag = "runs"
)]
pub async fn get_run_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<LogsParams>,
) -> Result<Json<Vec<RunLog>>, ApiError> {
    // 404 for unknown runs rather than an empty list
    state
        .db
        .get_run(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("run {id} not found")))?;

    let rows = state
        .db
        .list_run_logs(id, params.level.as_deref(), params.limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /api/runs/:id/with-logs - Run plus logs in one response
#[utoipa::path(
    get,
    path = "/api/runs/{id}/with-logs",
    responses(
        (status = 200, description = "Run with logs", body = RunWithLogs),
        (status = 404, description = "No such run")
    ),
    tag = "runs"
)]
pub async fn get_run_with_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<LogsParams>,
) -> Result<Json<RunWithLogs>, ApiError> {
    let run = state
        .db
        .get_run(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("run {id} not found")))?;
    let logs = state
        .db
        .list_run_logs(id, params.level.as_deref(), params.limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(RunWithLogs {
        run: run.into(),
        logs: logs.into_iter().map(Into::into).collect(),
    }))
}

/// PATCH /api/runs/:id/cancel - External cancellation
#[utoipa::path(
    patch,
    path = "/api/runs/{id}/cancel",
    responses(
        (status = 200, description = "The run after cancellation", body = Run),
        (status = 404, description = "No such run"),
        (status = 400, description = "Run already terminal")
    ),
    tag = "runs"
)]
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Run>, ApiError> {
    state
        .db
        .get_run(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("run {id} not found")))?;

    let cancelled = state
        .runner
        .cancel_run(id)
        .await
        .map_err(ApiError::internal)?;
    if !cancelled {
        return Err(ApiError::validation(format!(
            "run {id} is already in a terminal state"
        )));
    }

    let row = state
        .db
        .get_run(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("run {id} not found")))?;
    Ok(Json(row.into()))
}
