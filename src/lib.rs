//! # attendance-gateway
//!
//! REST gateway for event attendance: quota-bound registration with an
//! ordered waitlist, cancellation with automatic promotion, check-in,
//! organizer notifications and pre-event reminders.
//!
//! Every mutating subscription operation runs inside one storage
//! transaction that locks the event row before it recounts, so concurrent
//! requests, even from several server processes, can never admit more
//! registrations than the quota allows or leave a gap in the waitlist.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── SubscriptionService + waitlist (service/)
//!     │       └── NotificationSink ── NotificationQueue ── Mailer (notifications/)
//!     │
//!     ├── ReminderScheduler (reminders/) ── Mailer
//!     │
//!     └── SubscriptionStore / ReminderStore (persistence/)
//!             ├── PostgreSQL
//!             └── in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod notifications;
pub mod persistence;
pub mod reminders;
pub mod service;
