//! Reminder kinds and due reminder work items.

use chrono::{DateTime, Duration, Utc};

use super::{EventId, UserId};

/// One configured reminder, e.g. "the event starts within 15 minutes".
///
/// An event is due for this kind while its start lies between
/// `now + window_end` and `now + window_start` (inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderKind {
    /// Stable name; also the key of the per-kind "done" marker.
    pub name: String,
    /// Far edge of the window, measured back from the event start.
    pub window_start: Duration,
    /// Near edge of the window, measured back from the event start.
    pub window_end: Duration,
}

impl ReminderKind {
    /// Creates a kind from window edges in minutes before the event start.
    #[must_use]
    pub fn from_minutes(name: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            name: name.into(),
            window_start: Duration::minutes(start),
            window_end: Duration::minutes(end),
        }
    }

    /// Earliest and latest event start that is due at `now`.
    #[must_use]
    pub fn start_range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now + self.window_end, now + self.window_start)
    }

    /// Returns `true` if an event starting at `start` is due at `now`.
    #[must_use]
    pub fn is_due(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let (from, to) = self.start_range(now);
        from <= start && start <= to
    }
}

/// Target of a reminder: one (event, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReminderTarget {
    /// Event being reminded about.
    pub event_id: EventId,
    /// Recipient.
    pub user_id: UserId,
}

/// A reminder that still has to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    /// The pair this reminder is for.
    pub target: ReminderTarget,
    /// Event name for the mail body.
    pub event_name: String,
    /// Event start for the mail body.
    pub start_date: DateTime<Utc>,
    /// Recipient display name.
    pub user_name: String,
    /// Recipient address.
    pub user_email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds_are_inclusive() {
        let kind = ReminderKind::from_minutes("soon", 15, 1);
        let now = Utc::now();
        assert!(kind.is_due(now + Duration::minutes(10), now));
        assert!(kind.is_due(now + Duration::minutes(15), now));
        assert!(kind.is_due(now + Duration::minutes(1), now));
        assert!(!kind.is_due(now + Duration::seconds(30), now));
        assert!(!kind.is_due(now + Duration::minutes(16), now));
    }
}
