//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::notifications::NotificationQueue;
use crate::service::SubscriptionService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Subscription service for all business logic.
    pub subscription_service: Arc<SubscriptionService>,
    /// Notification queue, exposed for its counters and job status.
    pub notifications: NotificationQueue,
}
