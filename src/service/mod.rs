//! Service layer: business logic orchestration.
//!
//! [`SubscriptionService`] runs every subscription operation inside one
//! storage transaction and hands notifications to a
//! [`crate::notifications::NotificationSink`] after commit. The
//! [`waitlist`] module holds the placement and promotion steps shared by
//! all of its write paths.

pub mod subscription_service;
pub mod waitlist;

pub use subscription_service::SubscriptionService;
