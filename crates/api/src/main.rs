// Jobflow API server
// Thin HTTP layer over the durable engine: routes plus boundary config only

mod config;
mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobflow_durable::jobs::register_jobs;
use jobflow_durable::{
    ActivityRegistry, FsHistoryStore, HistoryStore, InMemoryHistoryStore, OrchestrationRegistry,
    ReplayExecutor,
};

/// App state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub executor: ReplayExecutor,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store: &'static str,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "jobflow_api=debug,jobflow_durable=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("jobflow-api starting...");

    // Pick the store: filesystem when a state directory is configured,
    // otherwise in-memory (no restart survival)
    let (store, store_kind): (Arc<dyn HistoryStore>, &'static str) =
        match std::env::var("JOBFLOW_STATE_DIR") {
            Ok(dir) => {
                let store = FsHistoryStore::new(&dir)
                    .with_context(|| format!("failed to open state directory {dir}"))?;
                tracing::info!(%dir, "using filesystem store");
                (Arc::new(store), "fs")
            }
            Err(_) => (Arc::new(InMemoryHistoryStore::new()), "memory"),
        };

    let mut orchestrations = OrchestrationRegistry::new();
    let mut activities = ActivityRegistry::new();
    register_jobs(&mut orchestrations, &mut activities, store.clone());

    let executor = ReplayExecutor::new(store, orchestrations, activities);

    // Re-arm timers and nudge instances persisted by a previous process
    executor
        .resume()
        .await
        .context("failed to resume persisted instances")?;

    let state = AppState { executor };
    let health_store = store_kind;

    let app = Router::new()
        .route(
            "/health",
            get(move || async move {
                Json(HealthResponse {
                    status: "ok",
                    version: env!("CARGO_PKG_VERSION"),
                    store: health_store,
                })
            }),
        )
        .route("/api/job-start/:job_name", get(handlers::start_job))
        .route("/api/job-status/:job_name", get(handlers::job_status))
        .route("/api/delay", get(handlers::delay))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config::bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
