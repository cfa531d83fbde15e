// Flow CRUD, versioning, and execution HTTP routes

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use reflux_contracts::{
    Flow, FlowSpec, FlowSpecDiff, FlowVersion, FlowVersionComparison, Run,
};
use reflux_engine::{dag, ExecuteRequest};
use reflux_storage::{CreateFlow, CreateRun, Database, UpdateFlow};

use crate::error::ApiError;
use crate::runner::FlowRunner;

/// App state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub runner: Arc<dyn FlowRunner>,
}

/// Request to create a flow
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFlowRequest {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub spec: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Request to update a flow (versioned)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateFlowRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub spec: Option<Value>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub version: Option<String>,
    pub changelog: Option<String>,
}

/// Request to execute a flow
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ExecuteFlowRequest {
    #[serde(default)]
    pub inputs: Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListFlowsParams {
    #[serde(default)]
    pub active: bool,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VersionQueryParams {
    pub version1: Option<Uuid>,
    pub version2: Option<Uuid>,
}

/// Create flow routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/flows", get(list_flows).post(create_flow))
        .route(
            "/api/flows/:id",
            get(get_flow).put(update_flow).delete(delete_flow),
        )
        .route("/api/flows/:id/execute", post(execute_flow))
        .route("/api/flows/:id/versions", get(list_versions))
        .route("/api/flows/:id/versions/:vid", get(get_version))
        .route(
            "/api/flows/:id/versions/:vid/rollback",
            post(rollback_version),
        )
        .with_state(state)
}

/// Admission-check a spec payload before it is stored or executed.
fn validate_spec(spec: &Value) -> Result<FlowSpec, ApiError> {
    let parsed: FlowSpec = serde_json::from_value(spec.clone())
        .map_err(|err| ApiError::validation("spec does not match the flow format").with_details(err.to_string()))?;
    dag::level_schedule(&parsed)
        .map_err(|err| ApiError::validation(err.to_string()))?;
    Ok(parsed)
}

/// POST /api/flows - Create a flow
#[utoipa::path(
    post,
    path = "/api/flows",
    request_body = CreateFlowRequest,
    responses(
        (status = 201, description = "Flow created", body = Flow),
        (status = 400, description = "Invalid spec")
    ),
    tag = "flows"
)]
pub async fn create_flow(
    State(state): State<AppState>,
    Json(req): Json<CreateFlowRequest>,
) -> Result<(StatusCode, Json<Flow>), ApiError> {
    validate_spec(&req.spec)?;

    let row = state
        .db
        .create_flow(CreateFlow {
            name: req.name,
            version: req.version,
            description: req.description,
            spec: req.spec,
            tags: req.tags,
            is_active: req.is_active,
        })
        .await
        .map_err(ApiError::internal)?;

    Ok((StatusCode::CREATED, Json(row.into())))
}

/// GET /api/flows - List flows
#[utoipa::path(
    get,
    path = "/api/flows",
    params(
        ("active" = Option<bool>, Query, description = "Only active flows"),
        ("tag" = Option<String>, Query, description = "Filter by tag")
    ),
    responses((status = 200, description = "List of flows", body = Vec<Flow>)),
    tag = "flows"
)]
pub async fn list_flows(
    State(state): State<AppState>,
    Query(params): Query<ListFlowsParams>,
) -> Result<Json<Vec<Flow>>, ApiError> {
    let rows = state
        .db
        .list_flows(params.active, params.tag.as_deref())
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /api/flows/:id - Get one flow
#[utoipa::path(
    get,
    path = "/api/flows/{id}",
    params(("id" = Uuid, Path, description = "Flow id")),
    responses(
        (status = 200, description = "The flow", body = Flow),
        (status = 404, description = "No such flow")
    ),
    tag = "flows"
)]
pub async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flow>, ApiError> {
    let row = state
        .db
        .get_flow(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("flow {id} not found")))?;
    Ok(Json(row.into()))
}

/// PUT /api/flows/:id - Versioned update
#[utoipa::path(
    put,
    path = "/api/flows/{id}",
    request_body = UpdateFlowRequest,
    responses(
        (status = 200, description = "Updated flow", body = Flow),
        (status = 400, description = "Invalid spec"),
        (status = 404, description = "No such flow")
    ),
    tag = "flows"
)]
pub async fn update_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFlowRequest>,
) -> Result<Json<Flow>, ApiError> {
    if let Some(spec) = &req.spec {
        validate_spec(spec)?;
    }

    let row = state
        .db
        .update_flow(
            id,
            UpdateFlow {
                name: req.name,
                description: req.description,
                spec: req.spec,
                tags: req.tags,
                is_active: req.is_active,
                version: req.version,
                changelog: req.changelog,
                updated_by: None,
            },
        )
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("flow {id} not found")))?;

    Ok(Json(row.into()))
}

/// DELETE /api/flows/:id - Cascade delete
#[utoipa::path(
    delete,
    path = "/api/flows/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such flow")
    ),
    tag = "flows"
)]
pub async fn delete_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.db.delete_flow(id).await.map_err(ApiError::internal)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("flow {id} not found")))
    }
}

/// POST /api/flows/:id/execute - Trigger a run (asynchronous)
#[utoipa::path(
    post,
    path = "/api/flows/{id}/execute",
    request_body = ExecuteFlowRequest,
    responses(
        (status = 200, description = "Run accepted", body = Run),
        (status = 400, description = "Invalid spec or inactive flow"),
        (status = 404, description = "No such flow")
    ),
    tag = "flows"
)]
pub async fn execute_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExecuteFlowRequest>,
) -> Result<Json<Run>, ApiError> {
    let flow = state
        .db
        .get_flow(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("flow {id} not found")))?;
    if !flow.is_active {
        return Err(ApiError::validation(format!("flow {id} is not active")));
    }

    // The spec is pinned at trigger time: later updates never touch this run
    let spec = validate_spec(&flow.spec)?;

    let run = state
        .db
        .create_run(CreateRun {
            flow_id: flow.id,
            flow_version: flow.version.clone(),
            inputs: req.inputs.clone(),
        })
        .await
        .map_err(ApiError::internal)?;

    state
        .runner
        .start_run(ExecuteRequest {
            run_id: run.id,
            flow_id: flow.id,
            flow_name: flow.name.clone(),
            spec,
            inputs: req.inputs,
        })
        .await
        .map_err(ApiError::internal)?;

    tracing::info!(run_id = %run.id, flow_id = %flow.id, "run started");

    // Re-read so the returned row reflects the accepted state
    let row = state
        .db
        .get_run(run.id)
        .await
        .map_err(ApiError::internal)?
        .unwrap_or(run);
    Ok(Json(row.into()))
}

/// GET /api/flows/:id/versions - List versions, or compare two
#[utoipa::path(
    get,
    path = "/api/flows/{id}/versions",
    params(
        ("version1" = Option<Uuid>, Query, description = "Compare: first version id"),
        ("version2" = Option<Uuid>, Query, description = "Compare: second version id")
    ),
    responses(
        (status = 200, description = "Versions or comparison"),
        (status = 404, description = "No such flow or version")
    ),
    tag = "flows"
)]
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<VersionQueryParams>,
) -> Result<axum::response::Response, ApiError> {
    use axum::response::IntoResponse;

    if let (Some(v1), Some(v2)) = (params.version1, params.version2) {
        let comparison = compare_versions(&state.db, id, v1, v2).await?;
        return Ok(Json(comparison).into_response());
    }

    let rows = state
        .db
        .list_flow_versions(id)
        .await
        .map_err(ApiError::internal)?;
    let versions: Vec<FlowVersion> = rows.into_iter().map(Into::into).collect();
    Ok(Json(versions).into_response())
}

/// GET /api/flows/:id/versions/:vid - One snapshot
#[utoipa::path(
    get,
    path = "/api/flows/{id}/versions/{vid}",
    responses(
        (status = 200, description = "The snapshot", body = FlowVersion),
        (status = 404, description = "No such version")
    ),
    tag = "flows"
)]
pub async fn get_version(
    State(state): State<AppState>,
    Path((id, vid)): Path<(Uuid, Uuid)>,
) -> Result<Json<FlowVersion>, ApiError> {
    let row = state
        .db
        .get_flow_version(id, vid)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("version {vid} not found")))?;
    Ok(Json(row.into()))
}

/// POST /api/flows/:id/versions/:vid/rollback - Restore a snapshot
#[utoipa::path(
    post,
    path = "/api/flows/{id}/versions/{vid}/rollback",
    responses(
        (status = 200, description = "Restored flow", body = Flow),
        (status = 404, description = "No such flow or version")
    ),
    tag = "flows"
)]
pub async fn rollback_version(
    State(state): State<AppState>,
    Path((id, vid)): Path<(Uuid, Uuid)>,
) -> Result<Json<Flow>, ApiError> {
    let row = state
        .db
        .rollback_flow(id, vid, None)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("flow {id} or version {vid} not found")))?;
    Ok(Json(row.into()))
}

async fn compare_versions(
    db: &Database,
    flow_id: Uuid,
    v1: Uuid,
    v2: Uuid,
) -> Result<FlowVersionComparison, ApiError> {
    let version1: FlowVersion = db
        .get_flow_version(flow_id, v1)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("version {v1} not found")))?
        .into();
    let version2: FlowVersion = db
        .get_flow_version(flow_id, v2)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("version {v2} not found")))?
        .into();

    let diff = diff_specs(&version1.spec, &version2.spec);
    Ok(FlowVersionComparison {
        flow_id,
        version1,
        version2,
        diff,
    })
}

/// Shallow spec diff: node ids added/removed/param-changed, edge deltas.
fn diff_specs(old: &Value, new: &Value) -> FlowSpecDiff {
    let parse = |v: &Value| serde_json::from_value::<FlowSpec>(v.clone()).ok();
    let (Some(old), Some(new)) = (parse(old), parse(new)) else {
        return FlowSpecDiff::default();
    };

    let old_nodes: HashMap<&str, &Value> = old
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), &n.params))
        .collect();
    let new_nodes: HashMap<&str, &Value> = new
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), &n.params))
        .collect();

    let mut diff = FlowSpecDiff::default();
    for (id, params) in &new_nodes {
        match old_nodes.get(id) {
            None => diff.nodes_added.push((*id).to_string()),
            Some(old_params) if *old_params != *params => {
                diff.nodes_changed.push((*id).to_string())
            }
            Some(_) => {}
        }
    }
    for id in old_nodes.keys() {
        if !new_nodes.contains_key(id) {
            diff.nodes_removed.push((*id).to_string());
        }
    }
    diff.nodes_added.sort();
    diff.nodes_removed.sort();
    diff.nodes_changed.sort();

    let edge_set = |spec: &FlowSpec| -> HashSet<(String, String)> {
        spec.edges
            .iter()
            .map(|e| (e.from.clone(), e.to.clone()))
            .collect()
    };
    let old_edges = edge_set(&old);
    let new_edges = edge_set(&new);
    diff.edges_added = new_edges.difference(&old_edges).count();
    diff.edges_removed = old_edges.difference(&new_edges).count();
    diff
}
