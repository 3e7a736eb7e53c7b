//! Database row models and their conversion into domain types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    DueReminder, EventRecord, ReminderTarget, Subscription, SubscriptionStatus, UserRecord,
};
use crate::error::GatewayError;

/// A row of the `subscriptions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRow {
    /// Primary key.
    pub id: Uuid,
    /// Subscribed user.
    pub user_id: Uuid,
    /// Target event.
    pub event_id: Uuid,
    /// Status text (`registered`, `waitlisted`, `cancelled`, `attended`).
    pub status: String,
    /// Waitlist position.
    pub position: Option<i32>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = GatewayError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SubscriptionStatus>()
            .map_err(|e| GatewayError::Integrity(e.to_string()))?;
        Ok(Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            event_id: row.event_id.into(),
            status,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// A row of the `events` table, limited to the columns this service reads.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Primary key.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Event start.
    pub start_date: DateTime<Utc>,
    /// Seat quota.
    pub quota: i32,
    /// Organizer.
    pub created_by: Uuid,
    /// Registration opens.
    pub opens_at: Option<DateTime<Utc>>,
    /// Registration closes.
    pub closes_at: Option<DateTime<Utc>>,
    /// Cancellation cutoff.
    pub unregister_closes_at: Option<DateTime<Utc>>,
    /// Catalog status text (`active` or `deleted`).
    pub status: String,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id.into(),
            name: row.name,
            start_date: row.start_date,
            quota: row.quota,
            created_by: row.created_by.into(),
            opens_at: row.opens_at,
            closes_at: row.closes_at,
            unregister_closes_at: row.unregister_closes_at,
            active: row.status == "active",
        }
    }
}

/// A row of the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    /// Primary key.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Account status text (`active` or `deleted`).
    pub status: String,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id.into(),
            name: row.name,
            email: row.email,
            active: row.status == "active",
        }
    }
}

/// One result row of the due-reminder query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DueReminderRow {
    /// Event being reminded about.
    pub event_id: Uuid,
    /// Event name.
    pub event_name: String,
    /// Event start.
    pub start_date: DateTime<Utc>,
    /// Recipient.
    pub user_id: Uuid,
    /// Recipient name.
    pub user_name: String,
    /// Recipient address.
    pub user_email: String,
}

impl From<DueReminderRow> for DueReminder {
    fn from(row: DueReminderRow) -> Self {
        Self {
            target: ReminderTarget {
                event_id: row.event_id.into(),
                user_id: row.user_id.into(),
            },
            event_name: row.event_name,
            start_date: row.start_date,
            user_name: row.user_name,
            user_email: row.user_email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_an_integrity_fault() {
        let now = Utc::now();
        let row = SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            status: "pending".to_string(),
            position: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(matches!(
            Subscription::try_from(row),
            Err(GatewayError::Integrity(_))
        ));
    }

    #[test]
    fn deleted_event_rows_are_inactive() {
        let row = EventRow {
            id: Uuid::new_v4(),
            name: "Archived".to_string(),
            start_date: Utc::now(),
            quota: 1,
            created_by: Uuid::new_v4(),
            opens_at: None,
            closes_at: None,
            unregister_closes_at: None,
            status: "deleted".to_string(),
        };
        assert!(!EventRecord::from(row).active);
    }
}
