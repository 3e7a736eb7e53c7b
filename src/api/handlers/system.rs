//! System endpoints: health check and notification queue inspection.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::JobId;
use crate::error::{ErrorResponse, GatewayError};
use crate::notifications::{JobStatus, QueueStats};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /notifications/queue` — Notification queue counters.
#[utoipa::path(
    get,
    path = "/notifications/queue",
    tag = "System",
    summary = "Notification queue statistics",
    description = "Waiting, active, completed and failed job counts since startup.",
    responses(
        (status = 200, description = "Queue counters", body = QueueStats),
    )
)]
pub async fn queue_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.notifications.stats())
}

/// `GET /notifications/jobs/{id}` — State of a pending or failed job.
///
/// # Errors
///
/// Returns [`GatewayError::JobNotFound`] for unknown or completed jobs.
#[utoipa::path(
    get,
    path = "/notifications/jobs/{id}",
    tag = "System",
    summary = "Notification job status",
    description = "Completed jobs are dropped from tracking and report 404.",
    params(("id" = uuid::Uuid, Path, description = "Job UUID")),
    responses(
        (status = 200, description = "Job status", body = JobStatus),
        (status = 404, description = "Job not tracked", body = ErrorResponse),
    )
)]
pub async fn job_status_handler(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let status = state
        .notifications
        .job_status(JobId::from_uuid(id))
        .await
        .ok_or(GatewayError::JobNotFound(id))?;
    Ok(Json(status))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/notifications/queue", get(queue_stats_handler))
        .route("/notifications/jobs/{id}", get(job_status_handler))
}
