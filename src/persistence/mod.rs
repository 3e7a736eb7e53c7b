//! Persistence layer: subscription storage and reminder markers.
//!
//! Storage is reached through three traits. [`SubscriptionStore`] serves
//! reads and opens [`SubscriptionTx`] transactions; every mutating
//! subscription operation runs inside exactly one such transaction, which
//! rolls back when dropped without [`SubscriptionTx::commit`].
//! [`ReminderStore`] backs the reminder sweep.
//!
//! [`postgres::PostgresStore`] is the production backend; the row lock
//! taken by [`SubscriptionTx::lock_event`] serializes all writers of one
//! event across processes. [`memory::MemoryStore`] keeps everything in
//! process and is used by tests and when persistence is disabled.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    DueReminder, EventId, EventRecord, NewSubscription, ReminderKind, ReminderTarget, Subscription,
    SubscriptionFilter, SubscriptionId, SubscriptionStatus, UserId, UserRecord,
};
use crate::error::GatewayError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Read access to subscriptions and the entry point for transactions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync + fmt::Debug {
    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] if no connection is
    /// available.
    async fn begin(&self) -> Result<Box<dyn SubscriptionTx>, GatewayError>;

    /// Looks up an event in the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn find_event(&self, event_id: EventId) -> Result<Option<EventRecord>, GatewayError>;

    /// Returns `(registered, waitlisted)` counts for an event, ignoring
    /// soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn count_subscriptions(&self, event_id: EventId) -> Result<(i64, i64), GatewayError>;

    /// Lists a user's non-deleted subscriptions matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn list_for_user(
        &self,
        user_id: UserId,
        filter: SubscriptionFilter,
    ) -> Result<Vec<Subscription>, GatewayError>;

    /// Loads a non-deleted subscription owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn find_owned(
        &self,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<Option<Subscription>, GatewayError>;

    /// Loads the user's non-deleted, non-cancelled subscription for an
    /// event.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn find_active_for_event(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<Subscription>, GatewayError>;
}

/// Operations available inside one subscription transaction.
///
/// Implementations must make all writes visible atomically on
/// [`commit`](Self::commit) and discard them if the value is dropped
/// first. Only the event row is locked; every writer of an event's
/// subscriptions takes that lock before reading the rows it acts on, so
/// row-level locks on subscriptions are not needed.
#[async_trait]
pub trait SubscriptionTx: Send {
    /// Loads the event and locks it for the rest of the transaction.
    ///
    /// Every write to an event's subscriptions happens after this lock,
    /// so concurrent admissions and cancellations for the same event are
    /// serialized and each recount sees the previous writer's result.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn lock_event(&mut self, event_id: EventId) -> Result<Option<EventRecord>, GatewayError>;

    /// Looks up a user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn find_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>, GatewayError>;

    /// Loads the (user, event) row, including soft-deleted and cancelled
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn find_for_user_event(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Subscription>, GatewayError>;

    /// Loads a non-deleted subscription owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn load_owned(
        &mut self,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<Option<Subscription>, GatewayError>;

    /// Loads a non-deleted subscription regardless of owner.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn load_subscription(
        &mut self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Subscription>, GatewayError>;

    /// Counts non-deleted subscriptions of an event in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn count_with_status(
        &mut self,
        event_id: EventId,
        status: SubscriptionStatus,
    ) -> Result<i64, GatewayError>;

    /// Highest waitlist position of an event, `None` when the waitlist is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn max_waitlist_position(&mut self, event_id: EventId)
    -> Result<Option<i32>, GatewayError>;

    /// Waitlisted subscription with the smallest position.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn first_waitlisted(
        &mut self,
        event_id: EventId,
    ) -> Result<Option<Subscription>, GatewayError>;

    /// Inserts a new subscription row.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if a row for the same (user,
    /// event) already exists and [`GatewayError::PersistenceError`] on
    /// other storage failures.
    async fn insert_subscription(
        &mut self,
        new: NewSubscription,
    ) -> Result<Subscription, GatewayError>;

    /// Sets status and position of a row, clears its deletion marker and
    /// bumps `updated_at`. Returns `None` if the row does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn write_state(
        &mut self,
        subscription_id: SubscriptionId,
        status: SubscriptionStatus,
        position: Option<i32>,
    ) -> Result<Option<Subscription>, GatewayError>;

    /// Decrements every waitlist position of the event that is greater
    /// than `position`. Returns the number of rows shifted.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn close_waitlist_gap(
        &mut self,
        event_id: EventId,
        position: i32,
    ) -> Result<u64, GatewayError>;

    /// Commits all writes of this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] if the commit fails; no
    /// write is then visible.
    async fn commit(self: Box<Self>) -> Result<(), GatewayError>;
}

/// Storage behind the reminder sweep.
#[async_trait]
pub trait ReminderStore: Send + Sync + fmt::Debug {
    /// Returns every (event, user) pair due for `kind` at `now` whose
    /// marker for that kind is not yet set: active events starting inside
    /// the kind's window, registered subscriptions, active users.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn due_reminders(
        &self,
        kind: &ReminderKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueReminder>, GatewayError>;

    /// Sets the `kind` marker for every target in one write, creating
    /// markers that do not exist yet. Returns the number of markers set.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn mark_reminders_done(
        &self,
        kind: &ReminderKind,
        targets: &[ReminderTarget],
    ) -> Result<u64, GatewayError>;
}
