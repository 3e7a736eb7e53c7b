//! Catalog views of events and users.
//!
//! Events and users are owned by upstream services; this crate only reads
//! them. [`EventRecord`] carries the quota and the registration windows
//! the admission rules depend on.

use chrono::{DateTime, Utc};

use super::{EventId, UserId};
use crate::error::GatewayError;

/// Read-only view of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Event identifier.
    pub id: EventId,
    /// Display name, used in notification copy.
    pub name: String,
    /// When the event starts.
    pub start_date: DateTime<Utc>,
    /// Maximum number of concurrently registered subscriptions.
    pub quota: i32,
    /// Organizer who receives "new subscription" notifications.
    pub created_by: UserId,
    /// Registration opens at this instant, if set.
    pub opens_at: Option<DateTime<Utc>>,
    /// Registration closes at this instant, if set.
    pub closes_at: Option<DateTime<Utc>>,
    /// Cancellation is refused after this instant, if set.
    pub unregister_closes_at: Option<DateTime<Utc>>,
    /// `false` once the event has been withdrawn from the catalog.
    pub active: bool,
}

impl EventRecord {
    /// Validates that `now` lies inside the registration window.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RegistrationNotOpen`] before `opens_at` and
    /// [`GatewayError::RegistrationClosed`] after `closes_at`.
    pub fn check_registration_window(&self, now: DateTime<Utc>) -> Result<(), GatewayError> {
        if let Some(opens_at) = self.opens_at
            && now < opens_at
        {
            return Err(GatewayError::RegistrationNotOpen(self.id.into()));
        }
        if let Some(closes_at) = self.closes_at
            && now > closes_at
        {
            return Err(GatewayError::RegistrationClosed(self.id.into()));
        }
        Ok(())
    }

    /// Validates that a subscription may still be cancelled at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnregistrationClosed`] after
    /// `unregister_closes_at`.
    pub fn check_unregister_window(&self, now: DateTime<Utc>) -> Result<(), GatewayError> {
        match self.unregister_closes_at {
            Some(cutoff) if now > cutoff => Err(GatewayError::UnregistrationClosed(self.id.into())),
            _ => Ok(()),
        }
    }
}

/// Read-only view of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Delivery address for notifications and reminders.
    pub email: String,
    /// `false` for deactivated accounts; they receive no reminders.
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn event() -> EventRecord {
        EventRecord {
            id: EventId::new(),
            name: "Welcome week".to_string(),
            start_date: Utc::now() + Duration::days(7),
            quota: 10,
            created_by: UserId::new(),
            opens_at: None,
            closes_at: None,
            unregister_closes_at: None,
            active: true,
        }
    }

    #[test]
    fn unbounded_windows_always_pass() {
        let e = event();
        assert!(e.check_registration_window(Utc::now()).is_ok());
        assert!(e.check_unregister_window(Utc::now()).is_ok());
    }

    #[test]
    fn registration_before_open_is_forbidden() {
        let now = Utc::now();
        let e = EventRecord {
            opens_at: Some(now + Duration::hours(1)),
            ..event()
        };
        assert!(matches!(
            e.check_registration_window(now),
            Err(GatewayError::RegistrationNotOpen(_))
        ));
    }

    #[test]
    fn registration_after_close_is_forbidden() {
        let now = Utc::now();
        let e = EventRecord {
            closes_at: Some(now - Duration::days(1)),
            ..event()
        };
        assert!(matches!(
            e.check_registration_window(now),
            Err(GatewayError::RegistrationClosed(_))
        ));
    }

    #[test]
    fn cancellation_after_cutoff_is_forbidden() {
        let now = Utc::now();
        let e = EventRecord {
            unregister_closes_at: Some(now - Duration::minutes(1)),
            ..event()
        };
        assert!(matches!(
            e.check_unregister_window(now),
            Err(GatewayError::UnregistrationClosed(_))
        ));
        assert!(e.check_unregister_window(now - Duration::hours(1)).is_ok());
    }
}
