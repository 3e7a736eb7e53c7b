//! Subscription handlers: register, list, get, cancel, check-in.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CheckInRequest, CheckInResponse, CreateSubscriptionRequest, MessageResponse, SubscriptionDto,
    SubscriptionQuery, UpdateSubscriptionRequest,
};
use crate::api::extract::CurrentUser;
use crate::app_state::AppState;
use crate::domain::{AdmissionOutcome, SubscriptionId, SubscriptionStatus};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /subscriptions` — Register the caller for an event.
///
/// # Errors
///
/// Returns [`GatewayError`] if the event is unknown or the registration
/// window is closed.
#[utoipa::path(
    post,
    path = "/api/v1/subscriptions",
    tag = "Subscriptions",
    summary = "Register for an event",
    description = "Takes a seat if the quota allows, otherwise appends the caller to the waitlist. Repeating the call returns the existing subscription unchanged.",
    request_body = CreateSubscriptionRequest,
    params(("x-user-id" = uuid::Uuid, Header, description = "Caller user id")),
    responses(
        (status = 201, description = "Subscription created or restored", body = SubscriptionDto),
        (status = 200, description = "Caller was already subscribed", body = SubscriptionDto),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 403, description = "Registration window closed", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn create_subscription(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let admission = state
        .subscription_service
        .create_subscription(user_id, req.event_id)
        .await?;
    let status = match admission.outcome {
        AdmissionOutcome::Existing => StatusCode::OK,
        AdmissionOutcome::Created | AdmissionOutcome::Restored => StatusCode::CREATED,
    };
    Ok((
        status,
        Json(SubscriptionDto::from(admission.subscription)),
    ))
}

/// `GET /subscriptions` — List the caller's subscriptions.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for an unknown status filter.
#[utoipa::path(
    get,
    path = "/api/v1/subscriptions",
    tag = "Subscriptions",
    summary = "List own subscriptions",
    description = "Returns the caller's subscriptions, optionally narrowed by status and event.",
    params(
        SubscriptionQuery,
        ("x-user-id" = uuid::Uuid, Header, description = "Caller user id"),
    ),
    responses(
        (status = 200, description = "Subscriptions", body = Vec<SubscriptionDto>),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
    )
)]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<SubscriptionQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let filter = query.into_filter()?;
    let subscriptions = state
        .subscription_service
        .get_user_subscriptions(user_id, filter)
        .await?;
    let data: Vec<SubscriptionDto> = subscriptions
        .into_iter()
        .map(SubscriptionDto::from)
        .collect();
    Ok(Json(data))
}

/// `GET /subscriptions/{id}` — Get one of the caller's subscriptions.
///
/// # Errors
///
/// Returns [`GatewayError::SubscriptionNotFound`] if it does not exist or
/// belongs to someone else.
#[utoipa::path(
    get,
    path = "/api/v1/subscriptions/{id}",
    tag = "Subscriptions",
    summary = "Get subscription",
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
        ("x-user-id" = uuid::Uuid, Header, description = "Caller user id"),
    ),
    responses(
        (status = 200, description = "Subscription", body = SubscriptionDto),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn get_subscription(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let subscription = state
        .subscription_service
        .get_subscription_by_id(SubscriptionId::from_uuid(id), user_id)
        .await?;
    Ok(Json(SubscriptionDto::from(subscription)))
}

/// `PATCH /subscriptions/{id}` — Cancel a subscription, returning it.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for any status other than
/// `cancelled` and [`GatewayError::UnregistrationClosed`] after the cutoff.
#[utoipa::path(
    patch,
    path = "/api/v1/subscriptions/{id}",
    tag = "Subscriptions",
    summary = "Update subscription status",
    description = "Only the transition to `cancelled` is supported. A freed seat goes to the head of the waitlist in the same transaction.",
    request_body = UpdateSubscriptionRequest,
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
        ("x-user-id" = uuid::Uuid, Header, description = "Caller user id"),
    ),
    responses(
        (status = 200, description = "Cancelled subscription", body = SubscriptionDto),
        (status = 400, description = "Unsupported status", body = ErrorResponse),
        (status = 403, description = "Cancellation cutoff passed", body = ErrorResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn update_subscription(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let status: SubscriptionStatus = req.status.parse()?;
    let subscription = state
        .subscription_service
        .update_subscription(SubscriptionId::from_uuid(id), user_id, status)
        .await?;
    Ok(Json(SubscriptionDto::from(subscription)))
}

/// `DELETE /subscriptions/{id}` — Cancel a subscription.
///
/// # Errors
///
/// Returns [`GatewayError::UnregistrationClosed`] after the cutoff and
/// [`GatewayError::SubscriptionNotFound`] for unknown ids.
#[utoipa::path(
    delete,
    path = "/api/v1/subscriptions/{id}",
    tag = "Subscriptions",
    summary = "Cancel subscription",
    description = "Same rules as PATCH to `cancelled`; returns a confirmation message.",
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
        ("x-user-id" = uuid::Uuid, Header, description = "Caller user id"),
    ),
    responses(
        (status = 200, description = "Subscription cancelled", body = MessageResponse),
        (status = 403, description = "Cancellation cutoff passed", body = ErrorResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn delete_subscription(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let message = state
        .subscription_service
        .delete_subscription(SubscriptionId::from_uuid(id), user_id)
        .await?;
    Ok(Json(MessageResponse { message }))
}

/// `POST /subscriptions/check-in` — Record attendance at the door.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the subscription belongs to
/// another event or holds no seat.
#[utoipa::path(
    post,
    path = "/api/v1/subscriptions/check-in",
    tag = "Subscriptions",
    summary = "Check in an attendee",
    request_body = CheckInRequest,
    params(("x-user-id" = uuid::Uuid, Header, description = "Caller user id")),
    responses(
        (status = 200, description = "Check-in result", body = CheckInResponse),
        (status = 400, description = "Subscription not eligible", body = ErrorResponse),
        (status = 404, description = "Event or subscription not found", body = ErrorResponse),
    )
)]
pub async fn check_in(
    State(state): State<AppState>,
    CurrentUser(operator): CurrentUser,
    Json(req): Json<CheckInRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    tracing::debug!(%operator, event_id = %req.event_id, "check-in requested");
    let result = state
        .subscription_service
        .check_in(req.event_id, req.subscription_id)
        .await?;
    Ok(Json(CheckInResponse::from(result)))
}

/// Subscription routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/subscriptions",
            post(create_subscription).get(list_subscriptions),
        )
        .route("/subscriptions/check-in", post(check_in))
        .route(
            "/subscriptions/{id}",
            get(get_subscription)
                .patch(update_subscription)
                .delete(delete_subscription),
        )
}
