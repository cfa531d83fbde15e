// Reflux API server
// Wires the store, dispatch bus, execution engine, run logger, and retention
// service behind the REST + webhook surface.

mod error;
mod flows;
mod nodes;
mod retention;
mod runner;
mod runs;
mod webhooks;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use reflux_bus::{BusConfig, InProcessBus, NodeBus};
use reflux_engine::{FlowExecutor, MetricSink, RunJournal, StepLogger};
use reflux_nodes::{register_builtins, NodeLibraryConfig};
use reflux_retention::{
    batch_size_from_env, interval_from_env, load_policy_from_env, spawn_retention_scheduler,
    NullBlobStore, RetentionService,
};
use reflux_storage::{Database, DbMetricSink, DbRunJournal, RunLogger, RunLoggerConfig};

use crate::runner::{FlowRunner, InProcessRunner};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now(),
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        flows::create_flow,
        flows::list_flows,
        flows::get_flow,
        flows::update_flow,
        flows::delete_flow,
        flows::execute_flow,
        flows::list_versions,
        flows::get_version,
        flows::rollback_version,
        runs::list_runs,
        runs::get_run,
        runs::get_run_logs,
        runs::get_run_with_logs,
        runs::cancel_run,
        retention::get_policy,
        retention::get_preview,
        retention::get_history,
        retention::get_latest,
        retention::get_stats,
        retention::run_cleanup,
    ),
    components(
        schemas(
            reflux_contracts::Flow,
            reflux_contracts::FlowVersion,
            reflux_contracts::FlowVersionComparison,
            reflux_contracts::FlowSpecDiff,
            reflux_contracts::FlowSpec,
            reflux_contracts::NodeSpec,
            reflux_contracts::EdgeSpec,
            reflux_contracts::Run,
            reflux_contracts::RunStatus,
            reflux_contracts::RunLog,
            reflux_contracts::RunWithLogs,
            reflux_contracts::LogLevel,
            reflux_contracts::RetentionPolicy,
            reflux_contracts::CleanupPreview,
            reflux_contracts::CleanupCounts,
            reflux_contracts::CleanupReport,
            reflux_contracts::CleanupAudit,
            reflux_contracts::CleanupTrigger,
            flows::CreateFlowRequest,
            flows::UpdateFlowRequest,
            flows::ExecuteFlowRequest,
            runs::ListRunsParams,
            retention::CleanupRequest,
            error::ErrorBody,
        )
    ),
    tags(
        (name = "flows", description = "Flow definition and execution endpoints"),
        (name = "runs", description = "Run state and log endpoints"),
        (name = "retention", description = "Retention administration endpoints")
    ),
    info(
        title = "Reflux API",
        version = "0.2.0",
        description = "Durable DAG workflow automation",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reflux_api=debug,reflux_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("reflux-api starting...");

    // Database
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let db = Database::from_url(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    tracing::info!("Connected to database");

    // Dispatch bus with the built-in node library
    let bus = Arc::new(InProcessBus::new(BusConfig::from_env()));
    let node_config = NodeLibraryConfig::from_env().with_database_pool(db.pool().clone());
    register_builtins(&bus, node_config).context("Failed to register node handlers")?;
    tracing::info!(nodes = bus.list_schemas().len(), "Node handlers registered");
    let bus: Arc<dyn NodeBus> = bus;

    // Engine seams: journal, buffered run logger, metric sink
    let journal: Arc<dyn RunJournal> = Arc::new(DbRunJournal::new(db.clone()));
    let run_logger = Arc::new(RunLogger::spawn(db.clone(), RunLoggerConfig::default()));
    let step_logger: Arc<dyn StepLogger> = run_logger.clone();
    let metrics: Arc<dyn MetricSink> = Arc::new(DbMetricSink::spawn(db.clone(), 1024));

    let executor = Arc::new(FlowExecutor::new(
        bus.clone(),
        journal.clone(),
        step_logger,
        metrics,
    ));
    let runner: Arc<dyn FlowRunner> = Arc::new(InProcessRunner::new(
        db.clone(),
        executor,
        journal.clone(),
    ));

    // Retention: validated policy, manual endpoint, daily scheduler
    let policy = load_policy_from_env().context("Invalid retention policy")?;
    let retention_service = Arc::new(
        RetentionService::new(
            db.clone(),
            Arc::new(NullBlobStore),
            policy,
            batch_size_from_env(),
        )
        .context("Failed to build retention service")?,
    );
    let _retention_task =
        spawn_retention_scheduler(retention_service.clone(), interval_from_env());

    // Module states
    let db = Arc::new(db);
    let flows_state = flows::AppState {
        db: db.clone(),
        runner: runner.clone(),
    };
    let runs_state = runs::AppState {
        db: db.clone(),
        runner: runner.clone(),
    };
    let webhooks_state = webhooks::AppState {
        db: db.clone(),
        runner: runner.clone(),
    };
    let retention_state = retention::AppState {
        db: db.clone(),
        service: retention_service,
    };
    let nodes_state = nodes::AppState { bus: bus.clone() };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .merge(flows::routes(flows_state))
        .merge(runs::routes(runs_state))
        .merge(webhooks::routes(webhooks_state))
        .merge(retention::routes(retention_state))
        .merge(nodes::routes(nodes_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let port = std::env::var("PORT").unwrap_or_else(|_| "9000".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("Server error")?;

    // Drain buffered logs before exit
    run_logger.shutdown().await;
    tracing::info!("reflux-api stopped");

    Ok(())
}
