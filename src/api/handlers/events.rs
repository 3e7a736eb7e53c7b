//! Event-scoped handlers: seat statistics and the caller's subscription.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::ActiveSubscriptionResponse;
use crate::api::extract::CurrentUser;
use crate::app_state::AppState;
use crate::domain::{EventId, EventStats};
use crate::error::{ErrorResponse, GatewayError};

/// `GET /events/{id}/stats` — Seat and waitlist counts.
///
/// # Errors
///
/// Returns [`GatewayError::EventNotFound`] if the event does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/stats",
    tag = "Events",
    summary = "Event subscription statistics",
    description = "Registered and waitlisted counts plus free seats, read from the same rows admission counts.",
    params(("id" = uuid::Uuid, Path, description = "Event UUID")),
    responses(
        (status = 200, description = "Statistics", body = EventStats),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn event_stats(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let stats = state
        .subscription_service
        .get_event_stats(EventId::from_uuid(id))
        .await?;
    Ok(Json(stats))
}

/// `GET /events/{id}/subscription` — The caller's live subscription.
///
/// # Errors
///
/// Returns [`GatewayError::ActiveSubscriptionNotFound`] if the caller has none.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/subscription",
    tag = "Events",
    summary = "Own subscription for an event",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
        ("x-user-id" = uuid::Uuid, Header, description = "Caller user id"),
    ),
    responses(
        (status = 200, description = "Active subscription", body = ActiveSubscriptionResponse),
        (status = 404, description = "No active subscription", body = ErrorResponse),
    )
)]
pub async fn own_subscription(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let subscription = state
        .subscription_service
        .find_active_subscription(EventId::from_uuid(id), user_id)
        .await?;
    Ok(Json(ActiveSubscriptionResponse {
        subscription_id: subscription.id,
        status: subscription.status,
    }))
}

/// Event routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/{id}/stats", get(event_stats))
        .route("/events/{id}/subscription", get(own_subscription))
}
