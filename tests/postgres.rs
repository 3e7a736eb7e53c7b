//! Subscription flows against a real PostgreSQL database.
//!
//! Each test gets a fresh database with the crate's migrations applied.
//! They need `DATABASE_URL` to point at a server the test user may create
//! databases on, so they are ignored by default:
//!
//! ```text
//! DATABASE_URL=postgres://... cargo test --test postgres -- --ignored
//! ```

#![allow(clippy::panic)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;

use attendance_gateway::domain::{EventId, Subscription, SubscriptionStatus, UserId};
use attendance_gateway::notifications::{LogMailer, NotificationQueue, QueuePolicy};
use attendance_gateway::persistence::PostgresStore;
use attendance_gateway::service::SubscriptionService;

async fn insert_user(pool: &PgPool, name: &str) -> UserId {
    let id = UserId::new();
    let inserted = sqlx::query("INSERT INTO users (id, name, email) VALUES ($1, $2, $3)")
        .bind(id.as_uuid())
        .bind(name)
        .bind(format!("{}-{id}@example.com", name.to_lowercase()))
        .execute(pool)
        .await;
    assert!(inserted.is_ok(), "user insert failed: {inserted:?}");
    id
}

async fn insert_event(pool: &PgPool, quota: i32) -> EventId {
    let organizer = insert_user(pool, "Organizer").await;
    let id = EventId::new();
    let inserted = sqlx::query(
        "INSERT INTO events (id, name, start_date, quota, created_by) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id.as_uuid())
    .bind("Robotics fair")
    .bind(Utc::now() + Duration::days(7))
    .bind(quota)
    .bind(organizer.as_uuid())
    .execute(pool)
    .await;
    assert!(inserted.is_ok(), "event insert failed: {inserted:?}");
    id
}

fn service(pool: &PgPool) -> SubscriptionService {
    let (queue, _worker) = NotificationQueue::start(QueuePolicy::default(), Arc::new(LogMailer));
    SubscriptionService::new(Arc::new(PostgresStore::new(pool.clone())), Arc::new(queue))
}

async fn admit(service: &SubscriptionService, user: UserId, event: EventId) -> Subscription {
    match service.create_subscription(user, event).await {
        Ok(admission) => admission.subscription,
        Err(e) => panic!("admission failed: {e}"),
    }
}

async fn live_positions(pool: &PgPool, event: EventId) -> Vec<i32> {
    let Ok(rows) = sqlx::query_scalar::<_, i32>(
        "SELECT position FROM subscriptions \
         WHERE event_id = $1 AND position IS NOT NULL AND deleted_at IS NULL \
         ORDER BY position",
    )
    .bind(event.as_uuid())
    .fetch_all(pool)
    .await
    else {
        panic!("position query failed");
    };
    rows
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn concurrent_admissions_never_exceed_quota(pool: PgPool) {
    let event = insert_event(&pool, 2).await;
    let service = Arc::new(service(&pool));
    let mut users = Vec::new();
    for name in ["Ana", "Ben", "Cy"] {
        users.push(insert_user(&pool, name).await);
    }

    let handles: Vec<_> = users
        .into_iter()
        .map(|user| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service.create_subscription(user, event).await
            })
        })
        .collect();
    let mut statuses = Vec::new();
    for handle in handles {
        let Ok(Ok(admission)) = handle.await else {
            panic!("admission failed");
        };
        statuses.push(admission.subscription.status);
    }

    let registered = statuses
        .iter()
        .filter(|s| **s == SubscriptionStatus::Registered)
        .count();
    assert_eq!(registered, 2);
    assert_eq!(live_positions(&pool, event).await, vec![1]);

    let Ok(stats) = service.get_event_stats(event).await else {
        panic!("stats failed");
    };
    assert_eq!((stats.registered_count, stats.waitlisted_count), (2, 1));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn cancellation_promotes_and_compacts(pool: PgPool) {
    let event = insert_event(&pool, 1).await;
    let service = service(&pool);
    let u1 = insert_user(&pool, "Ana").await;
    let u2 = insert_user(&pool, "Ben").await;
    let u3 = insert_user(&pool, "Cy").await;
    let s1 = admit(&service, u1, event).await;
    let s2 = admit(&service, u2, event).await;
    let s3 = admit(&service, u3, event).await;
    assert_eq!((s2.position, s3.position), (Some(1), Some(2)));

    assert!(service.delete_subscription(s1.id, u1).await.is_ok());

    let Ok(promoted) = service.get_subscription_by_id(s2.id, u2).await else {
        panic!("promoted row missing");
    };
    assert_eq!(promoted.status, SubscriptionStatus::Registered);
    assert_eq!(promoted.position, None);
    let Ok(moved) = service.get_subscription_by_id(s3.id, u3).await else {
        panic!("waitlisted row missing");
    };
    assert_eq!(moved.position, Some(1));
    assert_eq!(live_positions(&pool, event).await, vec![1]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn soft_deleted_waitlist_row_keeps_its_position(pool: PgPool) {
    let event = insert_event(&pool, 0).await;
    let service = service(&pool);
    let ana = insert_user(&pool, "Ana").await;
    let ben = insert_user(&pool, "Ben").await;
    let cy = insert_user(&pool, "Cy").await;
    let first = admit(&service, ana, event).await;
    admit(&service, ben, event).await;
    let last = admit(&service, cy, event).await;

    let deleted = sqlx::query("UPDATE subscriptions SET deleted_at = now() WHERE id = $1")
        .bind(last.id.as_uuid())
        .execute(&pool)
        .await;
    assert!(deleted.is_ok());

    let dan = insert_user(&pool, "Dan").await;
    let joined = admit(&service, dan, event).await;
    assert_eq!(joined.position, Some(3));

    assert!(service.delete_subscription(first.id, ana).await.is_ok());
    assert_eq!(live_positions(&pool, event).await, vec![1, 2]);
}
