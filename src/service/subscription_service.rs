//! Subscription service: admission, cancellation, check-in and queries.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::waitlist;
use crate::domain::{
    Admission, AdmissionOutcome, CheckIn, CheckInOutcome, EventId, EventRecord, EventStats,
    NewSubscription, Subscription, SubscriptionFilter, SubscriptionId, SubscriptionStatus, UserId,
    UserRecord,
};
use crate::error::GatewayError;
use crate::notifications::{NotificationJob, NotificationSink};
use crate::persistence::{SubscriptionStore, SubscriptionTx};

/// Orchestration layer for all subscription operations.
///
/// Holds no state of its own: every mutation opens one storage
/// transaction, locks the event row, recounts inside the transaction,
/// writes and commits. Notifications are enqueued only after a commit.
#[derive(Debug, Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl SubscriptionService {
    /// Creates a new `SubscriptionService`.
    #[must_use]
    pub fn new(store: Arc<dyn SubscriptionStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    /// Registers `user_id` for `event_id`.
    ///
    /// An active subscription is returned unchanged. A cancelled or
    /// soft-deleted one is restored and placed afresh; otherwise a new row
    /// is inserted. Both of the latter require the registration window to
    /// be open and take a seat if one is free, else the next waitlist
    /// position.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::EventNotFound`] if the event is unknown or withdrawn.
    /// - [`GatewayError::UserNotFound`] if the subscriber is unknown.
    /// - [`GatewayError::RegistrationNotOpen`] / [`GatewayError::RegistrationClosed`]
    ///   outside the registration window.
    /// - [`GatewayError::Internal`] if a concurrent request inserted the
    ///   same row first; the caller may retry.
    pub async fn create_subscription(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Admission, GatewayError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let event = tx
            .lock_event(event_id)
            .await?
            .filter(|e| e.active)
            .ok_or(GatewayError::EventNotFound(event_id.into()))?;
        let subscriber = tx
            .find_user(user_id)
            .await?
            .filter(|u| u.active)
            .ok_or(GatewayError::UserNotFound(user_id.into()))?;

        let (subscription, outcome) = match tx.find_for_user_event(user_id, event_id).await? {
            Some(existing) if existing.is_active() => {
                tracing::debug!(subscription_id = %existing.id, "subscription already active");
                return Ok(Admission {
                    subscription: existing,
                    outcome: AdmissionOutcome::Existing,
                });
            }
            Some(previous) => {
                event.check_registration_window(now)?;
                let placement = waitlist::place(tx.as_mut(), &event).await?;
                let restored = tx
                    .write_state(previous.id, placement.status(), placement.position())
                    .await?
                    .ok_or_else(|| {
                        GatewayError::Integrity(format!(
                            "subscription {} disappeared during restore",
                            previous.id
                        ))
                    })?;
                (restored, AdmissionOutcome::Restored)
            }
            None => {
                event.check_registration_window(now)?;
                let placement = waitlist::place(tx.as_mut(), &event).await?;
                let created = tx
                    .insert_subscription(NewSubscription {
                        user_id,
                        event_id,
                        placement,
                    })
                    .await?;
                (created, AdmissionOutcome::Created)
            }
        };

        let seated = subscription.status == SubscriptionStatus::Registered;
        let creator = if seated {
            tx.find_user(event.created_by).await?
        } else {
            None
        };
        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription.id,
            event_id = %event_id,
            user_id = %user_id,
            status = %subscription.status,
            position = ?subscription.position,
            outcome = ?outcome,
            "subscription admitted"
        );

        if seated {
            self.notify_creator(&event, creator, &subscriber).await;
        }

        Ok(Admission {
            subscription,
            outcome,
        })
    }

    /// Applies a status change requested by the owner. Only
    /// [`SubscriptionStatus::Cancelled`] is accepted.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidRequest`] for any other target status.
    /// - Everything [`Self::delete_subscription`] returns.
    pub async fn update_subscription(
        &self,
        subscription_id: SubscriptionId,
        user_id: UserId,
        status: SubscriptionStatus,
    ) -> Result<Subscription, GatewayError> {
        if status != SubscriptionStatus::Cancelled {
            return Err(GatewayError::InvalidRequest(format!(
                "status can only be changed to cancelled, got {status}"
            )));
        }
        self.cancel(subscription_id, user_id).await
    }

    /// Cancels a subscription and returns a confirmation message.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::SubscriptionNotFound`] if the subscription does
    ///   not exist or belongs to someone else.
    /// - [`GatewayError::UnregistrationClosed`] after the cancellation
    ///   cutoff.
    /// - [`GatewayError::InvalidRequest`] if attendance was already
    ///   recorded.
    /// - [`GatewayError::Integrity`] if the waitlist is corrupt.
    pub async fn delete_subscription(
        &self,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<String, GatewayError> {
        self.cancel(subscription_id, user_id).await?;
        Ok("Subscription cancelled successfully".to_string())
    }

    async fn cancel(
        &self,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<Subscription, GatewayError> {
        let mut tx = self.store.begin().await?;
        let cancelled = cancel_in_tx(tx.as_mut(), subscription_id, user_id, Utc::now()).await?;
        tx.commit().await?;
        Ok(cancelled)
    }

    /// Lists the caller's subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    pub async fn get_user_subscriptions(
        &self,
        user_id: UserId,
        filter: SubscriptionFilter,
    ) -> Result<Vec<Subscription>, GatewayError> {
        self.store.list_for_user(user_id, filter).await
    }

    /// Loads one of the caller's subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] if it does not exist
    /// or belongs to someone else.
    pub async fn get_subscription_by_id(
        &self,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<Subscription, GatewayError> {
        self.store
            .find_owned(subscription_id, user_id)
            .await?
            .ok_or(GatewayError::SubscriptionNotFound(subscription_id.into()))
    }

    /// Current seat and waitlist counts of an event, read straight from
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::EventNotFound`] if the event is unknown.
    pub async fn get_event_stats(&self, event_id: EventId) -> Result<EventStats, GatewayError> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(GatewayError::EventNotFound(event_id.into()))?;
        let (registered, waitlisted) = self.store.count_subscriptions(event_id).await?;
        Ok(EventStats::new(
            event_id,
            event.quota,
            registered,
            waitlisted,
        ))
    }

    /// Returns the caller's live subscription for an event.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ActiveSubscriptionNotFound`] if there is none.
    pub async fn find_active_subscription(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Subscription, GatewayError> {
        self.store
            .find_active_for_event(event_id, user_id)
            .await?
            .ok_or(GatewayError::ActiveSubscriptionNotFound {
                event_id: event_id.into(),
                user_id: user_id.into(),
            })
    }

    /// Records attendance for a registered subscription at the door.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::EventNotFound`] / [`GatewayError::SubscriptionNotFound`]
    ///   for unknown ids.
    /// - [`GatewayError::InvalidRequest`] if the subscription belongs to
    ///   another event or holds no seat.
    pub async fn check_in(
        &self,
        event_id: EventId,
        subscription_id: SubscriptionId,
    ) -> Result<CheckIn, GatewayError> {
        let mut tx = self.store.begin().await?;
        tx.lock_event(event_id)
            .await?
            .ok_or(GatewayError::EventNotFound(event_id.into()))?;
        let subscription = tx
            .load_subscription(subscription_id)
            .await?
            .ok_or(GatewayError::SubscriptionNotFound(subscription_id.into()))?;
        if subscription.event_id != event_id {
            return Err(GatewayError::InvalidRequest(format!(
                "subscription {subscription_id} does not belong to event {event_id}"
            )));
        }
        let attendee_name = tx
            .find_user(subscription.user_id)
            .await?
            .map(|u| u.name)
            .ok_or(GatewayError::UserNotFound(subscription.user_id.into()))?;

        match subscription.status {
            SubscriptionStatus::Attended => Ok(CheckIn {
                outcome: CheckInOutcome::AlreadyCheckedIn,
                attendee_name,
                subscription,
            }),
            SubscriptionStatus::Registered => {
                let attended = tx
                    .write_state(subscription_id, SubscriptionStatus::Attended, None)
                    .await?
                    .ok_or_else(|| {
                        GatewayError::Internal(format!(
                            "unable to record check-in for {subscription_id}"
                        ))
                    })?;
                tx.commit().await?;
                tracing::info!(%event_id, %subscription_id, "attendee checked in");
                Ok(CheckIn {
                    outcome: CheckInOutcome::CheckedIn,
                    attendee_name,
                    subscription: attended,
                })
            }
            SubscriptionStatus::Waitlisted | SubscriptionStatus::Cancelled => {
                Err(GatewayError::InvalidRequest(format!(
                    "subscription {subscription_id} is {}, not registered",
                    subscription.status
                )))
            }
        }
    }

    async fn notify_creator(
        &self,
        event: &EventRecord,
        creator: Option<UserRecord>,
        subscriber: &UserRecord,
    ) {
        let Some(creator) = creator else {
            tracing::warn!(
                event_id = %event.id,
                creator_id = %event.created_by,
                "event creator not found, skipping notification"
            );
            return;
        };
        let job = NotificationJob::SubscriptionCreated {
            creator_email: creator.email,
            creator_name: creator.name,
            event_name: event.name.clone(),
            subscriber_name: subscriber.name.clone(),
        };
        match self.notifier.enqueue(job).await {
            Ok(job_id) => {
                tracing::debug!(
                    %job_id,
                    event_id = %event.id,
                    "subscription notification enqueued"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    event_id = %event.id,
                    "failed to enqueue subscription notification"
                );
            }
        }
    }
}

/// Cancels a subscription inside `tx`, applying the waitlist side effect
/// first. Shared by every cancellation path.
async fn cancel_in_tx(
    tx: &mut dyn SubscriptionTx,
    subscription_id: SubscriptionId,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<Subscription, GatewayError> {
    let not_found = || GatewayError::SubscriptionNotFound(subscription_id.into());

    let event_id = tx
        .load_owned(subscription_id, user_id)
        .await?
        .ok_or_else(not_found)?
        .event_id;
    let event = tx
        .lock_event(event_id)
        .await?
        .ok_or(GatewayError::EventNotFound(event_id.into()))?;
    // Re-read under the event lock; a concurrent writer may have moved it.
    let current = tx
        .load_owned(subscription_id, user_id)
        .await?
        .ok_or_else(not_found)?;

    event.check_unregister_window(now)?;

    match current.status {
        SubscriptionStatus::Cancelled => return Ok(current),
        SubscriptionStatus::Attended => {
            return Err(GatewayError::InvalidRequest(format!(
                "subscription {subscription_id} is already checked in"
            )));
        }
        SubscriptionStatus::Registered | SubscriptionStatus::Waitlisted => {}
    }

    let promoted = waitlist::release(tx, &current).await?;
    let cancelled = tx
        .write_state(subscription_id, SubscriptionStatus::Cancelled, None)
        .await?
        .ok_or_else(not_found)?;

    tracing::info!(
        %subscription_id,
        %event_id,
        %user_id,
        previous_status = %current.status,
        promoted = ?promoted.map(|s| s.id),
        "subscription cancelled"
    );
    Ok(cancelled)
}
