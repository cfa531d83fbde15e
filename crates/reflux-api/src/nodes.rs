// Node introspection HTTP routes
// The bus registry drives the live listing; the static catalog carries port
// contracts for UI edge validation.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use reflux_bus::{NodeBus, NodeSchema};
use reflux_contracts::{builtin_catalog, CatalogEntry};

/// App state
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<dyn NodeBus>,
}

/// Create node introspection routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/nodes", get(list_nodes))
        .route("/api/nodes/catalog", get(get_catalog))
        .with_state(state)
}

/// GET /api/nodes - Registered handlers and their parameter schemas
pub async fn list_nodes(State(state): State<AppState>) -> Json<Vec<NodeSchema>> {
    Json(state.bus.list_schemas())
}

/// GET /api/nodes/catalog - Static port contracts for UI tooling
pub async fn get_catalog() -> Json<Vec<CatalogEntry>> {
    Json(builtin_catalog())
}
