//! REST API layer: route handlers, DTOs, extractors and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; health and queue
//! inspection live at the root. The OpenAPI document is served through
//! Swagger UI when the `swagger-ui` feature is enabled.

pub mod dto;
pub mod extract;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "attendance-gateway", description = "Event registration, waitlists and reminders"),
    paths(
        handlers::subscriptions::create_subscription,
        handlers::subscriptions::list_subscriptions,
        handlers::subscriptions::get_subscription,
        handlers::subscriptions::update_subscription,
        handlers::subscriptions::delete_subscription,
        handlers::subscriptions::check_in,
        handlers::events::event_stats,
        handlers::events::own_subscription,
        handlers::system::health_handler,
        handlers::system::queue_stats_handler,
        handlers::system::job_status_handler,
    ),
    components(schemas(
        dto::SubscriptionDto,
        dto::CreateSubscriptionRequest,
        dto::UpdateSubscriptionRequest,
        dto::CheckInRequest,
        dto::CheckInResponse,
        dto::ActiveSubscriptionResponse,
        dto::MessageResponse,
        crate::domain::EventStats,
        crate::domain::SubscriptionStatus,
        crate::domain::CheckInOutcome,
        crate::notifications::QueueStats,
        crate::notifications::JobStatus,
        crate::notifications::JobState,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "Subscriptions", description = "Registration, cancellation and check-in"),
        (name = "Events", description = "Per-event statistics"),
        (name = "System", description = "Health and notification queue"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_subscription_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/subscriptions"));
        assert!(doc.paths.paths.contains_key("/api/v1/subscriptions/{id}"));
        assert!(doc.paths.paths.contains_key("/api/v1/events/{id}/stats"));
        assert!(doc.paths.paths.contains_key("/notifications/queue"));
    }
}
