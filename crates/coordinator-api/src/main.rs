// Work-queue HTTP facade. A thin CRUD layer over the task store
// (add/lease/heartbeat/finish); the in-process coordinator engine
// (`coordinator-core`) is an independent subsystem this binary knows
// nothing about.

mod work_queue;

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use coordinator_storage::Database;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        work_queue::add_task,
        work_queue::lease_tasks,
        work_queue::heartbeat,
        work_queue::finish,
        work_queue::list_queue,
    ),
    components(schemas(
        coordinator_contracts::AddTaskRequest,
        coordinator_contracts::AddTaskResponse,
        coordinator_contracts::LeaseRequest,
        coordinator_contracts::LeaseResponse,
        coordinator_contracts::LeasedTask,
        coordinator_contracts::HeartbeatRequest,
        coordinator_contracts::FinishRequest,
        coordinator_contracts::SuccessResponse,
        coordinator_contracts::TaskStatus,
        coordinator_contracts::TaskSummary,
    )),
    tags(
        (name = "work_queue", description = "Work-queue task store endpoints (add/lease/heartbeat/finish)"),
    ),
    info(
        title = "Workflow Coordinator — Work Queue Facade",
        version = "0.1.0",
        description = "HTTP CRUD facade over the relational task store; the in-process coordinator engine is a separate, decoupled subsystem.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coordinator_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("coordinator-api starting...");

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let db = Database::from_url(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.run_migrations()
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Connected to database");

    let state = work_queue::AppState { db: Arc::new(db) };

    let app = Router::new()
        .route("/health", get(health))
        .merge(work_queue::routes(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
