// Dynamic webhook router
// Inspects method + path and finds an active flow with a matching
// `nodes.webhook.trigger` node; matches create a run and return 202.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::any;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use reflux_contracts::{FlowSpec, NodeSpec};
use reflux_engine::ExecuteRequest;
use reflux_storage::{CreateRun, Database, FlowRow};

use crate::error::ApiError;
use crate::runner::FlowRunner;

/// App state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub runner: Arc<dyn FlowRunner>,
}

/// 202 response body
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAccepted {
    pub run_id: Uuid,
    pub flow_id: Uuid,
}

/// Create webhook routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/webhook/*path", any(handle_webhook))
        .with_state(state)
}

/// Matching rule: the trigger's `path` equals the request path, and the
/// method matches, or the trigger declares no method, or the trigger method
/// is POST.
fn trigger_matches(node: &NodeSpec, method: &str, path: &str) -> bool {
    let Some(trigger_path) = node.params.get("path").and_then(Value::as_str) else {
        return false;
    };
    if trigger_path != path {
        return false;
    }
    match node.params.get("method").and_then(Value::as_str) {
        None => true,
        Some(m) => m.eq_ignore_ascii_case(method) || m.eq_ignore_ascii_case("POST"),
    }
}

/// First active flow whose spec declares a matching webhook trigger.
fn find_match<'a>(flows: &'a [FlowRow], method: &str, path: &str) -> Option<(&'a FlowRow, FlowSpec)> {
    for flow in flows {
        let Ok(spec) = serde_json::from_value::<FlowSpec>(flow.spec.clone()) else {
            continue;
        };
        if spec
            .webhook_triggers()
            .any(|node| trigger_matches(node, method, path))
        {
            return Some((flow, spec));
        }
    }
    None
}

/// ALL /webhook/*path - Trigger a matching flow
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAccepted>), ApiError> {
    let request_path = format!("/{}", path.trim_start_matches('/'));
    let method_name = method.as_str().to_string();

    let flows = state
        .db
        .list_active_flows()
        .await
        .map_err(ApiError::internal)?;
    let Some((flow, spec)) = find_match(&flows, &method_name, &request_path) else {
        return Err(ApiError::not_found(format!(
            "no webhook registered for {method_name} {request_path}"
        )));
    };

    let header_map: Value = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect::<serde_json::Map<String, Value>>()
        .into();

    // JSON bodies arrive as structures, anything else as text
    let body_value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&body).into_owned())
        })
    };

    let inputs = json!({
        "method": method_name,
        "path": request_path,
        "headers": header_map,
        "query": query,
        "body": body_value,
        "params": {},
    });

    let run = state
        .db
        .create_run(CreateRun {
            flow_id: flow.id,
            flow_version: flow.version.clone(),
            inputs: inputs.clone(),
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
            inputs,
        })
        .await
        .map_err(ApiError::internal)?;

    tracing::info!(
        run_id = %run.id,
        flow_id = %flow.id,
        path = %request_path,
        "webhook accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAccepted {
            run_id: run.id,
            flow_id: flow.id,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trigger(path: &str, method: Option<&str>) -> NodeSpec {
        let mut params = json!({ "path": path });
        if let Some(m) = method {
            params["method"] = json!(m);
        }
        NodeSpec {
            id: "hook".to_string(),
            node_type: "nodes.webhook.trigger".to_string(),
            params,
            version: None,
        }
    }

    fn flow_with(nodes: Vec<NodeSpec>) -> FlowRow {
        FlowRow {
            id: Uuid::now_v7(),
            name: "hooked".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            spec: serde_json::to_value(FlowSpec {
                nodes,
                edges: vec![],
            })
            .unwrap(),
            tags: vec![],
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn path_and_method_must_line_up() {
        let node = trigger("/ask-ai", Some("POST"));
        assert!(trigger_matches(&node, "POST", "/ask-ai"));
        assert!(!trigger_matches(&node, "POST", "/other"));
    }

    #[test]
    fn post_triggers_accept_any_method() {
        let node = trigger("/ask-ai", Some("POST"));
        assert!(trigger_matches(&node, "GET", "/ask-ai"));
    }

    #[test]
    fn methodless_triggers_accept_any_method() {
        let node = trigger("/ask-ai", None);
        assert!(trigger_matches(&node, "DELETE", "/ask-ai"));
    }

    #[test]
    fn non_post_triggers_require_their_method() {
        let node = trigger("/poll", Some("GET"));
        assert!(trigger_matches(&node, "GET", "/poll"));
        assert!(!trigger_matches(&node, "PUT", "/poll"));
    }

    #[test]
    fn first_matching_flow_wins() {
        let flows = vec![
            flow_with(vec![trigger("/a", None)]),
            flow_with(vec![trigger("/b", None)]),
        ];
        let (matched, _) = find_match(&flows, "POST", "/b").unwrap();
        assert_eq!(matched.id, flows[1].id);
        assert!(find_match(&flows, "POST", "/unknown").is_none());
    }

    #[test]
    fn flows_without_webhook_nodes_never_match() {
        let flows = vec![flow_with(vec![NodeSpec {
            id: "n".to_string(),
            node_type: "nodes.http.request".to_string(),
            params: json!({ "path": "/a" }),
            version: None,
        }])];
        assert!(find_match(&flows, "POST", "/a").is_none());
    }
}
