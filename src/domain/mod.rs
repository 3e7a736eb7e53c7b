//! Domain layer: identifiers, subscription records, catalog views and
//! reminder work items.

pub mod event;
pub mod ids;
pub mod reminder;
pub mod subscription;

pub use event::{EventRecord, UserRecord};
pub use ids::{EventId, JobId, SubscriptionId, UserId};
pub use reminder::{DueReminder, ReminderKind, ReminderTarget};
pub use subscription::{
    Admission, AdmissionOutcome, CheckIn, CheckInOutcome, EventStats, NewSubscription, Placement,
    Subscription, SubscriptionFilter, SubscriptionStatus,
};
