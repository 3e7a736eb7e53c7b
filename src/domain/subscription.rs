//! Subscription records and the status domain.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{EventId, SubscriptionId, UserId};
use crate::error::GatewayError;

/// Lifecycle state of a subscription.
///
/// `Waitlisted` is the only state that carries a queue position; rows are
/// moved into and out of it exclusively by the waitlist routines in
/// [`crate::service::waitlist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Holds a seat counted against the event quota.
    Registered,
    /// Queued for a seat, ordered by position.
    Waitlisted,
    /// Left the event.
    Cancelled,
    /// Checked in at the venue.
    Attended,
}

impl SubscriptionStatus {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Waitlisted => "waitlisted",
            Self::Cancelled => "cancelled",
            Self::Attended => "attended",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(Self::Registered),
            "waitlisted" => Ok(Self::Waitlisted),
            "cancelled" => Ok(Self::Cancelled),
            "attended" => Ok(Self::Attended),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }
}

/// Where the admission step placed a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// A seat was available.
    Registered,
    /// The event is full; queued at the given 1-based position.
    Waitlisted(i32),
}

impl Placement {
    /// Status the row takes for this placement.
    #[must_use]
    pub const fn status(&self) -> SubscriptionStatus {
        match self {
            Self::Registered => SubscriptionStatus::Registered,
            Self::Waitlisted(_) => SubscriptionStatus::Waitlisted,
        }
    }

    /// Waitlist position, present only when waitlisted.
    #[must_use]
    pub const fn position(&self) -> Option<i32> {
        match self {
            Self::Registered => None,
            Self::Waitlisted(position) => Some(*position),
        }
    }
}

/// One user's relationship to one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    /// Row identifier.
    pub id: SubscriptionId,
    /// Subscribed user.
    pub user_id: UserId,
    /// Target event.
    pub event_id: EventId,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Waitlist position; `Some` only while waitlisted.
    pub position: Option<i32>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion marker: the user left and may register again.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Returns `true` when the row counts as the user's live subscription:
    /// not soft-deleted and not cancelled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && self.status != SubscriptionStatus::Cancelled
    }
}

/// Values for a row about to be inserted.
#[derive(Debug, Clone, Copy)]
pub struct NewSubscription {
    /// Subscribing user.
    pub user_id: UserId,
    /// Target event.
    pub event_id: EventId,
    /// Admission result.
    pub placement: Placement,
}

/// Optional narrowing for subscription listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionFilter {
    /// Only return rows in this status.
    pub status: Option<SubscriptionStatus>,
    /// Only return rows for this event.
    pub event_id: Option<EventId>,
}

/// How `create_subscription` resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// A new row was inserted.
    Created,
    /// A cancelled or soft-deleted row was revived.
    Restored,
    /// The user already had an active subscription; returned unchanged.
    Existing,
}

/// Result of a registration request.
#[derive(Debug, Clone)]
pub struct Admission {
    /// The subscription as stored after the call.
    pub subscription: Subscription,
    /// Which branch produced it.
    pub outcome: AdmissionOutcome,
}

/// Result of a check-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckInOutcome {
    /// Attendance recorded now.
    CheckedIn,
    /// Attendance had already been recorded.
    AlreadyCheckedIn,
}

/// Outcome of a check-in together with the attendee it concerns.
#[derive(Debug, Clone)]
pub struct CheckIn {
    /// Whether attendance was recorded by this call.
    pub outcome: CheckInOutcome,
    /// Display name of the attendee.
    pub attendee_name: String,
    /// The subscription after the call.
    pub subscription: Subscription,
}

/// Subscription counts for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct EventStats {
    /// Event the counts belong to.
    pub event_id: EventId,
    /// Subscriptions currently holding a seat.
    pub registered_count: i64,
    /// Subscriptions currently queued.
    pub waitlisted_count: i64,
    /// Seats still free, never negative.
    pub spots_left: i64,
}

impl EventStats {
    /// Derives `spots_left` from the quota and the registered count.
    #[must_use]
    pub fn new(
        event_id: EventId,
        quota: i32,
        registered_count: i64,
        waitlisted_count: i64,
    ) -> Self {
        Self {
            event_id,
            registered_count,
            waitlisted_count,
            spots_left: (i64::from(quota) - registered_count).max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_representation() {
        for status in [
            SubscriptionStatus::Registered,
            SubscriptionStatus::Waitlisted,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Attended,
        ] {
            assert_eq!(
                status.as_str().parse::<SubscriptionStatus>().ok(),
                Some(status)
            );
        }
        assert!("pending".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn placement_maps_to_status_and_position() {
        assert_eq!(
            Placement::Registered.status(),
            SubscriptionStatus::Registered
        );
        assert_eq!(Placement::Registered.position(), None);
        assert_eq!(
            Placement::Waitlisted(3).status(),
            SubscriptionStatus::Waitlisted
        );
        assert_eq!(Placement::Waitlisted(3).position(), Some(3));
    }

    #[test]
    fn spots_left_never_negative() {
        let id = EventId::new();
        assert_eq!(EventStats::new(id, 5, 2, 0).spots_left, 3);
        assert_eq!(EventStats::new(id, 2, 2, 4).spots_left, 0);
        assert_eq!(EventStats::new(id, 1, 3, 0).spots_left, 0);
    }

    #[test]
    fn cancelled_or_deleted_rows_are_inactive() {
        let now = Utc::now();
        let mut sub = Subscription {
            id: SubscriptionId::new(),
            user_id: UserId::new(),
            event_id: EventId::new(),
            status: SubscriptionStatus::Registered,
            position: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(sub.is_active());
        sub.status = SubscriptionStatus::Cancelled;
        assert!(!sub.is_active());
        sub.status = SubscriptionStatus::Attended;
        sub.deleted_at = Some(now);
        assert!(!sub.is_active());
    }
}
