//! In-process implementation of the persistence layer.
//!
//! The whole dataset sits behind one [`tokio::sync::Mutex`]. A transaction
//! owns the guard for its lifetime and works on a staged copy that replaces
//! the shared state only on commit, so transactions are fully serialized
//! and an uncommitted transaction leaves nothing behind. Commit rejects a
//! staged state in which two live rows share a waitlist position, like the
//! deferred constraint of the SQL schema.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ReminderStore, SubscriptionStore, SubscriptionTx};
use crate::domain::{
    DueReminder, EventId, EventRecord, NewSubscription, ReminderKind, ReminderTarget, Subscription,
    SubscriptionFilter, SubscriptionId, SubscriptionStatus, UserId, UserRecord,
};
use crate::error::GatewayError;

type MarkerKey = (EventId, UserId, String);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    events: HashMap<EventId, EventRecord>,
    users: HashMap<UserId, UserRecord>,
    // Insertion order doubles as creation order.
    subscriptions: Vec<Subscription>,
    markers: HashMap<MarkerKey, bool>,
}

impl MemoryState {
    fn live(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter().filter(|s| s.deleted_at.is_none())
    }

    fn find(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.live().find(|s| s.id == id)
    }

    /// Commit-time check mirroring the deferred position constraint: no
    /// two live rows of an event share a waitlist position.
    fn check_positions(&self) -> Result<(), GatewayError> {
        let mut seen = HashSet::new();
        for s in self.live() {
            if let Some(position) = s.position
                && !seen.insert((s.event_id, position))
            {
                return Err(GatewayError::Integrity(format!(
                    "waitlist position {position} of event {} is taken twice",
                    s.event_id
                )));
            }
        }
        Ok(())
    }

    fn count(&self, event_id: EventId, status: SubscriptionStatus) -> i64 {
        let n = self
            .live()
            .filter(|s| s.event_id == event_id && s.status == status)
            .count();
        i64::try_from(n).unwrap_or(i64::MAX)
    }
}

/// In-memory store for tests and persistence-disabled runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog event.
    pub async fn insert_event(&self, event: EventRecord) {
        self.state.lock().await.events.insert(event.id, event);
    }

    /// Adds or replaces a user.
    pub async fn insert_user(&self, user: UserRecord) {
        self.state.lock().await.users.insert(user.id, user);
    }

    /// Stores a subscription row verbatim, bypassing admission rules.
    pub async fn put_subscription(&self, subscription: Subscription) {
        let mut state = self.state.lock().await;
        state.subscriptions.retain(|s| s.id != subscription.id);
        state.subscriptions.push(subscription);
    }

    /// Sets the soft-deletion marker of a row. Returns `false` if the row
    /// does not exist.
    pub async fn soft_delete(&self, subscription_id: SubscriptionId) -> bool {
        let mut state = self.state.lock().await;
        match state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        {
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Every row of an event, including cancelled and soft-deleted ones.
    pub async fn subscriptions_for_event(&self, event_id: EventId) -> Vec<Subscription> {
        self.state
            .lock()
            .await
            .subscriptions
            .iter()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Marker state of one reminder kind for one pair; `None` if absent.
    pub async fn marker(&self, kind: &str, target: ReminderTarget) -> Option<bool> {
        self.state
            .lock()
            .await
            .markers
            .get(&(target.event_id, target.user_id, kind.to_string()))
            .copied()
    }

    /// Creates a marker row in the given state.
    pub async fn put_marker(&self, kind: &str, target: ReminderTarget, done: bool) {
        self.state
            .lock()
            .await
            .markers
            .insert((target.event_id, target.user_id, kind.to_string()), done);
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn SubscriptionTx>, GatewayError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn find_event(&self, event_id: EventId) -> Result<Option<EventRecord>, GatewayError> {
        Ok(self.state.lock().await.events.get(&event_id).cloned())
    }

    async fn count_subscriptions(&self, event_id: EventId) -> Result<(i64, i64), GatewayError> {
        let state = self.state.lock().await;
        Ok((
            state.count(event_id, SubscriptionStatus::Registered),
            state.count(event_id, SubscriptionStatus::Waitlisted),
        ))
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        filter: SubscriptionFilter,
    ) -> Result<Vec<Subscription>, GatewayError> {
        let state = self.state.lock().await;
        Ok(state
            .live()
            .filter(|s| s.user_id == user_id)
            .filter(|s| filter.status.is_none_or(|status| s.status == status))
            .filter(|s| filter.event_id.is_none_or(|e| s.event_id == e))
            .cloned()
            .collect())
    }

    async fn find_owned(
        &self,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<Option<Subscription>, GatewayError> {
        let state = self.state.lock().await;
        Ok(state
            .find(subscription_id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn find_active_for_event(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<Subscription>, GatewayError> {
        let state = self.state.lock().await;
        Ok(state
            .live()
            .find(|s| s.event_id == event_id && s.user_id == user_id && s.is_active())
            .cloned())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl SubscriptionTx for MemoryTx {
    async fn lock_event(&mut self, event_id: EventId) -> Result<Option<EventRecord>, GatewayError> {
        Ok(self.staged.events.get(&event_id).cloned())
    }

    async fn find_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>, GatewayError> {
        Ok(self.staged.users.get(&user_id).cloned())
    }

    async fn find_for_user_event(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Subscription>, GatewayError> {
        Ok(self
            .staged
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.event_id == event_id)
            .cloned())
    }

    async fn load_owned(
        &mut self,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<Option<Subscription>, GatewayError> {
        Ok(self
            .staged
            .find(subscription_id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn load_subscription(
        &mut self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Subscription>, GatewayError> {
        Ok(self.staged.find(subscription_id).cloned())
    }

    async fn count_with_status(
        &mut self,
        event_id: EventId,
        status: SubscriptionStatus,
    ) -> Result<i64, GatewayError> {
        Ok(self.staged.count(event_id, status))
    }

    async fn max_waitlist_position(
        &mut self,
        event_id: EventId,
    ) -> Result<Option<i32>, GatewayError> {
        Ok(self
            .staged
            .live()
            .filter(|s| s.event_id == event_id && s.status == SubscriptionStatus::Waitlisted)
            .filter_map(|s| s.position)
            .max())
    }

    async fn first_waitlisted(
        &mut self,
        event_id: EventId,
    ) -> Result<Option<Subscription>, GatewayError> {
        // Rows without a position sort first, as NULLS FIRST does in SQL,
        // so a corrupt row surfaces instead of being skipped.
        Ok(self
            .staged
            .live()
            .filter(|s| s.event_id == event_id && s.status == SubscriptionStatus::Waitlisted)
            .min_by_key(|s| s.position)
            .cloned())
    }

    async fn insert_subscription(
        &mut self,
        new: NewSubscription,
    ) -> Result<Subscription, GatewayError> {
        if self
            .staged
            .subscriptions
            .iter()
            .any(|s| s.user_id == new.user_id && s.event_id == new.event_id)
        {
            return Err(GatewayError::Internal(format!(
                "concurrent registration for user {} on event {}",
                new.user_id, new.event_id
            )));
        }
        let now = Utc::now();
        let row = Subscription {
            id: SubscriptionId::new(),
            user_id: new.user_id,
            event_id: new.event_id,
            status: new.placement.status(),
            position: new.placement.position(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.staged.subscriptions.push(row.clone());
        Ok(row)
    }

    async fn write_state(
        &mut self,
        subscription_id: SubscriptionId,
        status: SubscriptionStatus,
        position: Option<i32>,
    ) -> Result<Option<Subscription>, GatewayError> {
        let Some(row) = self
            .staged
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        else {
            return Ok(None);
        };
        row.status = status;
        row.position = position;
        row.deleted_at = None;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn close_waitlist_gap(
        &mut self,
        event_id: EventId,
        position: i32,
    ) -> Result<u64, GatewayError> {
        let now = Utc::now();
        let mut shifted = 0;
        for row in &mut self.staged.subscriptions {
            let live_waitlisted = row.event_id == event_id
                && row.status == SubscriptionStatus::Waitlisted
                && row.deleted_at.is_none();
            if !live_waitlisted {
                continue;
            }
            if let Some(p) = row.position
                && p > position
            {
                row.position = Some(p - 1);
                row.updated_at = now;
                shifted += 1;
            }
        }
        Ok(shifted)
    }

    async fn commit(self: Box<Self>) -> Result<(), GatewayError> {
        let Self { mut guard, staged } = *self;
        staged.check_positions()?;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn due_reminders(
        &self,
        kind: &ReminderKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueReminder>, GatewayError> {
        let state = self.state.lock().await;
        let due = state
            .live()
            .filter(|s| s.status == SubscriptionStatus::Registered)
            .filter_map(|s| {
                let event = state.events.get(&s.event_id)?;
                let user = state.users.get(&s.user_id)?;
                let done = state
                    .markers
                    .get(&(event.id, user.id, kind.name.clone()))
                    .copied()
                    .unwrap_or(false);
                (event.active && user.active && !done && kind.is_due(event.start_date, now))
                    .then(|| DueReminder {
                        target: ReminderTarget {
                            event_id: event.id,
                            user_id: user.id,
                        },
                        event_name: event.name.clone(),
                        start_date: event.start_date,
                        user_name: user.name.clone(),
                        user_email: user.email.clone(),
                    })
            })
            .collect();
        Ok(due)
    }

    async fn mark_reminders_done(
        &self,
        kind: &ReminderKind,
        targets: &[ReminderTarget],
    ) -> Result<u64, GatewayError> {
        let mut state = self.state.lock().await;
        for target in targets {
            state
                .markers
                .insert((target.event_id, target.user_id, kind.name.clone()), true);
        }
        Ok(u64::try_from(targets.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Placement;

    fn event() -> EventRecord {
        EventRecord {
            id: EventId::new(),
            name: "Robotics fair".to_string(),
            start_date: Utc::now(),
            quota: 2,
            created_by: UserId::new(),
            opens_at: None,
            closes_at: None,
            unregister_closes_at: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        let e = event();
        store.insert_event(e.clone()).await;

        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let inserted = tx
            .insert_subscription(NewSubscription {
                user_id: UserId::new(),
                event_id: e.id,
                placement: Placement::Registered,
            })
            .await;
        assert!(inserted.is_ok());
        drop(tx);

        assert!(store.subscriptions_for_event(e.id).await.is_empty());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let e = event();
        store.insert_event(e.clone()).await;

        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let Ok(row) = tx
            .insert_subscription(NewSubscription {
                user_id: UserId::new(),
                event_id: e.id,
                placement: Placement::Waitlisted(1),
            })
            .await
        else {
            panic!("insert failed");
        };
        assert!(tx.commit().await.is_ok());

        let rows = store.subscriptions_for_event(e.id).await;
        assert_eq!(rows, vec![row]);
        assert_eq!(store.count_subscriptions(e.id).await.ok(), Some((0, 1)));
    }

    #[tokio::test]
    async fn duplicate_user_event_insert_is_rejected() {
        let store = MemoryStore::new();
        let e = event();
        let user_id = UserId::new();
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let new = NewSubscription {
            user_id,
            event_id: e.id,
            placement: Placement::Registered,
        };
        assert!(tx.insert_subscription(new).await.is_ok());
        assert!(matches!(
            tx.insert_subscription(new).await,
            Err(GatewayError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn close_gap_only_shifts_positions_above() {
        let store = MemoryStore::new();
        let e = event();
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let mut ids = Vec::new();
        for position in 1..=4 {
            let new = NewSubscription {
                user_id: UserId::new(),
                event_id: e.id,
                placement: Placement::Waitlisted(position),
            };
            let Ok(row) = tx.insert_subscription(new).await else {
                panic!("insert failed");
            };
            ids.push(row.id);
        }
        let Some(&second) = ids.get(1) else {
            panic!("missing row");
        };
        let cancelled = tx
            .write_state(second, SubscriptionStatus::Cancelled, None)
            .await;
        assert!(matches!(cancelled, Ok(Some(_))));
        assert_eq!(tx.close_waitlist_gap(e.id, 2).await.ok(), Some(2));
        assert!(tx.commit().await.is_ok());

        let mut positions: Vec<_> = store
            .subscriptions_for_event(e.id)
            .await
            .into_iter()
            .filter_map(|s| s.position)
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn close_gap_leaves_soft_deleted_rows_alone() {
        let store = MemoryStore::new();
        let e = event();
        let mut rows = Vec::new();
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        for position in 1..=3 {
            let new = NewSubscription {
                user_id: UserId::new(),
                event_id: e.id,
                placement: Placement::Waitlisted(position),
            };
            let Ok(row) = tx.insert_subscription(new).await else {
                panic!("insert failed");
            };
            rows.push(row);
        }
        assert!(tx.commit().await.is_ok());
        let (Some(head), Some(tail)) = (rows.first(), rows.last()) else {
            panic!("missing rows");
        };
        assert!(store.soft_delete(tail.id).await);

        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let seated = SubscriptionStatus::Registered;
        assert!(matches!(
            tx.write_state(head.id, seated, None).await,
            Ok(Some(_))
        ));
        assert_eq!(tx.close_waitlist_gap(e.id, 1).await.ok(), Some(1));
        assert_eq!(tx.max_waitlist_position(e.id).await.ok(), Some(Some(1)));
        assert!(tx.commit().await.is_ok());

        let stale = store
            .subscriptions_for_event(e.id)
            .await
            .into_iter()
            .find(|s| s.id == tail.id);
        assert_eq!(stale.and_then(|s| s.position), Some(3));
    }

    #[tokio::test]
    async fn commit_rejects_a_shared_live_position() {
        let store = MemoryStore::new();
        let e = event();
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        for _ in 0..2 {
            let new = NewSubscription {
                user_id: UserId::new(),
                event_id: e.id,
                placement: Placement::Waitlisted(1),
            };
            assert!(tx.insert_subscription(new).await.is_ok());
        }
        assert!(matches!(tx.commit().await, Err(GatewayError::Integrity(_))));
        assert!(store.subscriptions_for_event(e.id).await.is_empty());
    }
}
