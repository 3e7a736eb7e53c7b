//! Event reminder scheduler.
//!
//! [`ReminderScheduler`] runs on a fixed timer, independent of requests,
//! and reads the same event and subscription tables as the subscription
//! service through [`crate::persistence::ReminderStore`].

pub mod scheduler;

pub use scheduler::{ReminderScheduler, TickReport};
