//! HTTP request handlers
//!
//! Thin adapters between the wire and the engine: resolve environment
//! tunables, mint correlation ids, derive instance ids, and translate
//! engine results into response payloads. No orchestration state lives here.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use jobflow_durable::jobs::{self, JobParams};
use jobflow_durable::ExecutorError;

use crate::config::{self, JobDurations};
use crate::AppState;

/// Bounded wait for the status query
const STATUS_QUERY_WAIT: Duration = Duration::from_secs(30);

/// Engine failures surface as 500s with a JSON error body
pub struct ApiError(ExecutorError);

impl From<ExecutorError> for ApiError {
    fn from(err: ExecutorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Acknowledgement payload for an accepted start request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobResponse {
    /// Instance id owning the job
    pub id: String,

    /// Where to poll for the job's status
    pub status_query_get_uri: String,
}

/// Status payload returned by the query endpoint
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub status: String,
}

/// GET /api/job-start/{job_name}
///
/// Starts (or idempotently re-joins) the job and answers 202 with a
/// status-check location.
pub async fn start_job(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let durations = JobDurations::from_env();
    let params = JobParams::new(
        Uuid::now_v7(),
        durations.queued_secs,
        durations.in_progress_secs,
    );

    let id = jobs::start_job(&state.executor, &job_name, params).await?;
    info!(%id, %job_name, "job start accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(StartJobResponse {
            status_query_get_uri: format!("/api/job-status/{job_name}"),
            id,
        }),
    ))
}

/// GET /api/job-status/{job_name}
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let status = jobs::query_job_status(&state.executor, &job_name, STATUS_QUERY_WAIT).await?;
    Ok(Json(JobStatusResponse { status }))
}

/// GET /api/delay
///
/// Plain bounded sleep with no durable machinery behind it.
pub async fn delay() -> String {
    let secs = config::delay_secs();
    info!(secs, "delaying");
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    format!("Delayed for {secs} seconds.")
}
