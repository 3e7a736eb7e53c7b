//! Subscription DTOs for registration, cancellation, listing and check-in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    CheckIn, CheckInOutcome, EventId, Subscription, SubscriptionFilter, SubscriptionId,
    SubscriptionStatus, UserId,
};
use crate::error::GatewayError;

/// Subscription as returned by every subscription endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionDto {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Subscribed user.
    pub user_id: UserId,
    /// Target event.
    pub event_id: EventId,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Waitlist position, only while waitlisted.
    pub position: Option<i32>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionDto {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            event_id: s.event_id,
            status: s.status,
            position: s.position,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Request body for `POST /subscriptions`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    /// Event to register for.
    pub event_id: EventId,
}

/// Request body for `PATCH /subscriptions/{id}`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSubscriptionRequest {
    /// Target status; only `cancelled` is accepted.
    pub status: String,
}

/// Query parameters for `GET /subscriptions`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubscriptionQuery {
    /// Only subscriptions in this status.
    pub status: Option<String>,
    /// Only subscriptions for this event.
    pub event_id: Option<uuid::Uuid>,
}

impl SubscriptionQuery {
    /// Validates the query into a storage filter.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for an unknown status.
    pub fn into_filter(self) -> Result<SubscriptionFilter, GatewayError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<SubscriptionStatus>)
            .transpose()?;
        Ok(SubscriptionFilter {
            status,
            event_id: self.event_id.map(EventId::from_uuid),
        })
    }
}

/// Request body for `POST /subscriptions/check-in`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckInRequest {
    /// Event the attendee is entering.
    pub event_id: EventId,
    /// Subscription presented at the door.
    pub subscription_id: SubscriptionId,
}

/// Response body for `POST /subscriptions/check-in`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckInResponse {
    /// `checked_in` or `already_checked_in`.
    pub status: CheckInOutcome,
    /// Human-readable outcome.
    pub message: String,
    /// Display name of the attendee.
    pub attendee_name: String,
    /// Subscription after the check-in.
    pub subscription: SubscriptionDto,
}

impl From<CheckIn> for CheckInResponse {
    fn from(c: CheckIn) -> Self {
        let message = match c.outcome {
            CheckInOutcome::CheckedIn => "Check-in completed",
            CheckInOutcome::AlreadyCheckedIn => "Attendee already checked in",
        };
        Self {
            status: c.outcome,
            message: message.to_string(),
            attendee_name: c.attendee_name,
            subscription: c.subscription.into(),
        }
    }
}

/// Response body for `GET /events/{id}/subscription`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActiveSubscriptionResponse {
    /// The caller's live subscription for the event.
    pub subscription_id: SubscriptionId,
    /// Its current status.
    pub status: SubscriptionStatus,
}

/// Plain confirmation body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    /// Confirmation text.
    pub message: String,
}
