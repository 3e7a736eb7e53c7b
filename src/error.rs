//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2101,
///     "message": "registration has closed for event 8f0e…",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category         | HTTP Status                |
/// |-----------|------------------|----------------------------|
/// | 1000–1999 | Validation       | 400 Bad Request / 401      |
/// | 2000–2099 | Not Found        | 404 Not Found              |
/// | 2100–2199 | Temporal rules   | 403 Forbidden              |
/// | 3000–3999 | Server           | 500 Internal Server Error  |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Event with the given ID was not found.
    #[error("event not found: {0}")]
    EventNotFound(uuid::Uuid),

    /// Subscription with the given ID was not found for the caller.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(uuid::Uuid),

    /// The user has no live subscription for the event.
    #[error("no active subscription of user {user_id} for event {event_id}")]
    ActiveSubscriptionNotFound {
        /// Event looked up.
        event_id: uuid::Uuid,
        /// User looked up.
        user_id: uuid::Uuid,
    },

    /// User with the given ID was not found.
    #[error("user not found: {0}")]
    UserNotFound(uuid::Uuid),

    /// Notification job is unknown or already completed.
    #[error("notification job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Registration window has not opened yet.
    #[error("registration not yet open for event {0}")]
    RegistrationNotOpen(uuid::Uuid),

    /// Registration window has closed.
    #[error("registration has closed for event {0}")]
    RegistrationClosed(uuid::Uuid),

    /// Cancellation cutoff has passed.
    #[error("unregistration period has closed for event {0}")]
    UnregistrationClosed(uuid::Uuid),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Caller identity missing or malformed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Stored data violates a waitlist or quota invariant.
    #[error("data integrity fault: {0}")]
    Integrity(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Unauthorized(_) => 1002,
            Self::EventNotFound(_) => 2001,
            Self::SubscriptionNotFound(_) => 2002,
            Self::UserNotFound(_) => 2003,
            Self::JobNotFound(_) => 2004,
            Self::ActiveSubscriptionNotFound { .. } => 2005,
            Self::RegistrationNotOpen(_) => 2101,
            Self::RegistrationClosed(_) => 2102,
            Self::UnregistrationClosed(_) => 2103,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::Integrity(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::EventNotFound(_)
            | Self::SubscriptionNotFound(_)
            | Self::UserNotFound(_)
            | Self::JobNotFound(_)
            | Self::ActiveSubscriptionNotFound { .. } => StatusCode::NOT_FOUND,
            Self::RegistrationNotOpen(_)
            | Self::RegistrationClosed(_)
            | Self::UnregistrationClosed(_) => StatusCode::FORBIDDEN,
            Self::PersistenceError(_) | Self::Integrity(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
