//! PostgreSQL implementation of the persistence layer.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{DueReminderRow, EventRow, SubscriptionRow, UserRow};
use super::{ReminderStore, SubscriptionStore, SubscriptionTx};
use crate::domain::{
    DueReminder, EventId, EventRecord, NewSubscription, ReminderKind, ReminderTarget, Subscription,
    SubscriptionFilter, SubscriptionId, SubscriptionStatus, UserId, UserRecord,
};
use crate::error::GatewayError;

fn db_error(e: sqlx::Error) -> GatewayError {
    GatewayError::PersistenceError(e.to_string())
}

fn to_subscription(row: Option<SubscriptionRow>) -> Result<Option<Subscription>, GatewayError> {
    row.map(Subscription::try_from).transpose()
}

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), GatewayError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))
    }
}

#[async_trait]
impl SubscriptionStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn SubscriptionTx>, GatewayError> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(Box::new(PgSubscriptionTx { tx }))
    }

    async fn find_event(&self, event_id: EventId) -> Result<Option<EventRecord>, GatewayError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT id, name, start_date, quota, created_by, opens_at, closes_at, \
             unregister_closes_at, status FROM events WHERE id = $1",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(EventRecord::from))
    }

    async fn count_subscriptions(&self, event_id: EventId) -> Result<(i64, i64), GatewayError> {
        sqlx::query_as::<_, (i64, i64)>(
            "SELECT \
               COUNT(*) FILTER (WHERE status = 'registered'), \
               COUNT(*) FILTER (WHERE status = 'waitlisted') \
             FROM subscriptions WHERE event_id = $1 AND deleted_at IS NULL",
        )
        .bind(event_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        filter: SubscriptionFilter,
    ) -> Result<Vec<Subscription>, GatewayError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, event_id, status, position, created_at, updated_at, deleted_at \
             FROM subscriptions \
             WHERE user_id = $1 AND deleted_at IS NULL \
               AND ($2::text IS NULL OR status = $2) \
               AND ($3::uuid IS NULL OR event_id = $3) \
             ORDER BY created_at ASC",
        )
        .bind(user_id.as_uuid())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.event_id.map(Uuid::from))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn find_owned(
        &self,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<Option<Subscription>, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, event_id, status, position, created_at, updated_at, deleted_at \
             FROM subscriptions WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(subscription_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        to_subscription(row)
    }

    async fn find_active_for_event(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<Subscription>, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, event_id, status, position, created_at, updated_at, deleted_at \
             FROM subscriptions \
             WHERE event_id = $1 AND user_id = $2 AND status <> 'cancelled' AND deleted_at IS NULL",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        to_subscription(row)
    }
}

/// An open PostgreSQL transaction. Rolled back by `sqlx` when dropped
/// uncommitted.
pub struct PgSubscriptionTx {
    tx: Transaction<'static, Postgres>,
}

impl fmt::Debug for PgSubscriptionTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgSubscriptionTx").finish_non_exhaustive()
    }
}

#[async_trait]
impl SubscriptionTx for PgSubscriptionTx {
    async fn lock_event(&mut self, event_id: EventId) -> Result<Option<EventRecord>, GatewayError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT id, name, start_date, quota, created_by, opens_at, closes_at, \
             unregister_closes_at, status FROM events WHERE id = $1 FOR UPDATE",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.map(EventRecord::from))
    }

    async fn find_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>, GatewayError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, status FROM users WHERE id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_for_user_event(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Subscription>, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, event_id, status, position, created_at, updated_at, deleted_at \
             FROM subscriptions WHERE user_id = $1 AND event_id = $2",
        )
        .bind(user_id.as_uuid())
        .bind(event_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        to_subscription(row)
    }

    async fn load_owned(
        &mut self,
        subscription_id: SubscriptionId,
        user_id: UserId,
    ) -> Result<Option<Subscription>, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, event_id, status, position, created_at, updated_at, deleted_at \
             FROM subscriptions WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(subscription_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        to_subscription(row)
    }

    async fn load_subscription(
        &mut self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Subscription>, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, event_id, status, position, created_at, updated_at, deleted_at \
             FROM subscriptions WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(subscription_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        to_subscription(row)
    }

    async fn count_with_status(
        &mut self,
        event_id: EventId,
        status: SubscriptionStatus,
    ) -> Result<i64, GatewayError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM subscriptions \
             WHERE event_id = $1 AND status = $2 AND deleted_at IS NULL",
        )
        .bind(event_id.as_uuid())
        .bind(status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn max_waitlist_position(
        &mut self,
        event_id: EventId,
    ) -> Result<Option<i32>, GatewayError> {
        sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(position) FROM subscriptions \
             WHERE event_id = $1 AND status = 'waitlisted' AND deleted_at IS NULL",
        )
        .bind(event_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn first_waitlisted(
        &mut self,
        event_id: EventId,
    ) -> Result<Option<Subscription>, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, user_id, event_id, status, position, created_at, updated_at, deleted_at \
             FROM subscriptions \
             WHERE event_id = $1 AND status = 'waitlisted' AND deleted_at IS NULL \
             ORDER BY position ASC NULLS FIRST LIMIT 1",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        to_subscription(row)
    }

    async fn insert_subscription(
        &mut self,
        new: NewSubscription,
    ) -> Result<Subscription, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "INSERT INTO subscriptions (id, user_id, event_id, status, position) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, event_id, status, position, created_at, updated_at, deleted_at",
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id.as_uuid())
        .bind(new.event_id.as_uuid())
        .bind(new.placement.status().as_str())
        .bind(new.placement.position())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => GatewayError::Internal(
                format!(
                    "concurrent registration for user {} on event {}",
                    new.user_id, new.event_id
                ),
            ),
            other => db_error(other),
        })?;

        Subscription::try_from(row)
    }

    async fn write_state(
        &mut self,
        subscription_id: SubscriptionId,
        status: SubscriptionStatus,
        position: Option<i32>,
    ) -> Result<Option<Subscription>, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "UPDATE subscriptions \
             SET status = $2, position = $3, deleted_at = NULL, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, user_id, event_id, status, position, created_at, updated_at, deleted_at",
        )
        .bind(subscription_id.as_uuid())
        .bind(status.as_str())
        .bind(position)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        to_subscription(row)
    }

    async fn close_waitlist_gap(
        &mut self,
        event_id: EventId,
        position: i32,
    ) -> Result<u64, GatewayError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET position = position - 1, updated_at = now() \
             WHERE event_id = $1 AND status = 'waitlisted' AND position > $2 \
               AND deleted_at IS NULL",
        )
        .bind(event_id.as_uuid())
        .bind(position)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), GatewayError> {
        self.tx.commit().await.map_err(db_error)
    }
}

#[async_trait]
impl ReminderStore for PostgresStore {
    async fn due_reminders(
        &self,
        kind: &ReminderKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueReminder>, GatewayError> {
        let (from, to) = kind.start_range(now);
        let rows = sqlx::query_as::<_, DueReminderRow>(
            "SELECT e.id AS event_id, e.name AS event_name, e.start_date, \
                    u.id AS user_id, u.name AS user_name, u.email AS user_email \
             FROM events e \
             JOIN subscriptions s \
               ON s.event_id = e.id AND s.status = 'registered' AND s.deleted_at IS NULL \
             JOIN users u ON u.id = s.user_id AND u.status = 'active' \
             LEFT JOIN reminder_markers m \
               ON m.event_id = e.id AND m.user_id = u.id AND m.kind = $3 \
             WHERE e.status = 'active' \
               AND e.start_date BETWEEN $1 AND $2 \
               AND COALESCE(m.done, FALSE) = FALSE",
        )
        .bind(from)
        .bind(to)
        .bind(&kind.name)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(DueReminder::from).collect())
    }

    async fn mark_reminders_done(
        &self,
        kind: &ReminderKind,
        targets: &[ReminderTarget],
    ) -> Result<u64, GatewayError> {
        if targets.is_empty() {
            return Ok(0);
        }
        let event_ids: Vec<Uuid> = targets.iter().map(|t| t.event_id.into()).collect();
        let user_ids: Vec<Uuid> = targets.iter().map(|t| t.user_id.into()).collect();

        let result = sqlx::query(
            "INSERT INTO reminder_markers (event_id, user_id, kind, done) \
             SELECT t.event_id, t.user_id, $3, TRUE \
             FROM UNNEST($1::uuid[], $2::uuid[]) AS t(event_id, user_id) \
             ON CONFLICT (event_id, user_id, kind) \
             DO UPDATE SET done = TRUE, updated_at = now()",
        )
        .bind(event_ids)
        .bind(user_ids)
        .bind(&kind.name)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}
