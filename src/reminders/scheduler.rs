//! Periodic reminder sweep.
//!
//! Each tick, for every configured [`ReminderKind`], the scheduler fetches
//! the (event, user) pairs that are due and not yet marked, sends all
//! reminders concurrently and then marks the successful ones in a single
//! write. A failed send leaves its pair unmarked, so the next tick retries
//! it for as long as the event stays inside the window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::{DueReminder, ReminderKind, ReminderTarget};
use crate::error::GatewayError;
use crate::notifications::{Mailer, OutgoingEmail};
use crate::persistence::ReminderStore;

/// Outcome of one kind's sweep within a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Reminder kind name.
    pub kind: String,
    /// Pairs found due.
    pub due: usize,
    /// Reminders delivered and marked done.
    pub sent: usize,
    /// Deliveries that failed and stay pending.
    pub failed: usize,
}

/// Sends "your event starts soon" emails exactly once per pair and kind.
#[derive(Debug)]
pub struct ReminderScheduler {
    store: Arc<dyn ReminderStore>,
    mailer: Arc<dyn Mailer>,
    kinds: Vec<ReminderKind>,
    interval: Duration,
}

impl ReminderScheduler {
    /// Creates a scheduler for the given kinds.
    #[must_use]
    pub fn new(
        store: Arc<dyn ReminderStore>,
        mailer: Arc<dyn Mailer>,
        kinds: Vec<ReminderKind>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            kinds,
            interval,
        }
    }

    /// Runs one sweep over every kind. A kind whose storage calls fail is
    /// logged and left out of the result; the other kinds still run.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<TickReport> {
        let mut reports = Vec::with_capacity(self.kinds.len());
        for kind in &self.kinds {
            match self.sweep(kind, now).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(kind = %kind.name, error = %e, "reminder sweep failed"),
            }
        }
        reports
    }

    async fn sweep(
        &self,
        kind: &ReminderKind,
        now: DateTime<Utc>,
    ) -> Result<TickReport, GatewayError> {
        let due = self.store.due_reminders(kind, now).await?;
        let attempts = due.iter().map(|reminder| async move {
            let result = self.mailer.send(&reminder_email(reminder)).await;
            (reminder, result)
        });

        let mut delivered: Vec<ReminderTarget> = Vec::with_capacity(due.len());
        for (reminder, result) in join_all(attempts).await {
            match result {
                Ok(()) => delivered.push(reminder.target),
                Err(e) => tracing::warn!(
                    kind = %kind.name,
                    event_id = %reminder.target.event_id,
                    user_id = %reminder.target.user_id,
                    error = %e,
                    "reminder delivery failed, will retry next tick"
                ),
            }
        }

        if !delivered.is_empty() {
            self.store.mark_reminders_done(kind, &delivered).await?;
        }

        let report = TickReport {
            kind: kind.name.clone(),
            due: due.len(),
            sent: delivered.len(),
            failed: due.len() - delivered.len(),
        };
        if report.due > 0 {
            tracing::info!(
                kind = %report.kind,
                due = report.due,
                sent = report.sent,
                failed = report.failed,
                "reminder sweep finished"
            );
        }
        Ok(report)
    }

    /// Runs [`Self::tick`] on a fixed interval until the task is aborted.
    /// Ticks never overlap; a tick that overruns skips the missed slots.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                kinds = self.kinds.len(),
                "reminder scheduler started"
            );
            loop {
                ticker.tick().await;
                self.tick(Utc::now()).await;
            }
        })
    }
}

fn reminder_email(reminder: &DueReminder) -> OutgoingEmail {
    OutgoingEmail {
        to: reminder.user_email.clone(),
        subject: "Reminder to attend an event".to_string(),
        body: format!(
            "Hi {}. Remember to attend the event {} on {}",
            reminder.user_name,
            reminder.event_name,
            reminder.start_date.format("%d/%m/%Y")
        ),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{
        EventId, EventRecord, Subscription, SubscriptionId, SubscriptionStatus, UserId, UserRecord,
    };
    use crate::notifications::MailError;
    use crate::persistence::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    #[derive(Debug, Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
        failing: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
            if self.failing.lock().await.contains(&email.to) {
                return Err(MailError::Transport("mailbox unavailable".to_string()));
            }
            self.sent.lock().await.push(email.clone());
            Ok(())
        }
    }

    struct Fixture {
        store: MemoryStore,
        mailer: Arc<CapturingMailer>,
        scheduler: ReminderScheduler,
        event: EventRecord,
    }

    fn now() -> DateTime<Utc> {
        let Some(t) = Utc.with_ymd_and_hms(2026, 3, 14, 9, 50, 0).single() else {
            panic!("invalid test timestamp");
        };
        t
    }

    async fn fixture(starts_in_minutes: i64) -> Fixture {
        let store = MemoryStore::new();
        let event = EventRecord {
            id: EventId::new(),
            name: "Data science talk".to_string(),
            start_date: now() + chrono::Duration::minutes(starts_in_minutes),
            quota: 10,
            created_by: UserId::new(),
            opens_at: None,
            closes_at: None,
            unregister_closes_at: None,
            active: true,
        };
        store.insert_event(event.clone()).await;
        let mailer = Arc::new(CapturingMailer::default());
        let scheduler = ReminderScheduler::new(
            Arc::new(store.clone()),
            Arc::clone(&mailer) as Arc<dyn Mailer>,
            vec![ReminderKind::from_minutes("first", 15, 1)],
            Duration::from_secs(30),
        );
        Fixture {
            store,
            mailer,
            scheduler,
            event,
        }
    }

    async fn attendee(f: &Fixture, name: &str, status: SubscriptionStatus, active: bool) -> UserId {
        let id = UserId::new();
        f.store
            .insert_user(UserRecord {
                id,
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                active,
            })
            .await;
        let stamp = now();
        f.store
            .put_subscription(Subscription {
                id: SubscriptionId::new(),
                user_id: id,
                event_id: f.event.id,
                status,
                position: (status == SubscriptionStatus::Waitlisted).then_some(1),
                created_at: stamp,
                updated_at: stamp,
                deleted_at: None,
            })
            .await;
        id
    }

    fn only(reports: &[TickReport]) -> &TickReport {
        let [report] = reports else {
            panic!("expected one report, got {reports:?}");
        };
        report
    }

    #[tokio::test]
    async fn second_sweep_sends_nothing_new() {
        let f = fixture(10).await;
        let a = attendee(&f, "Ana", SubscriptionStatus::Registered, true).await;
        attendee(&f, "Ben", SubscriptionStatus::Registered, true).await;

        let first = f.scheduler.tick(now()).await;
        let report = only(&first);
        assert_eq!((report.due, report.sent, report.failed), (2, 2, 0));
        let target = ReminderTarget {
            event_id: f.event.id,
            user_id: a,
        };
        assert_eq!(f.store.marker("first", target).await, Some(true));

        let second = f.scheduler.tick(now() + chrono::Duration::seconds(5)).await;
        assert_eq!(only(&second).due, 0);
        assert_eq!(f.mailer.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_next_tick() {
        let f = fixture(10).await;
        attendee(&f, "Ana", SubscriptionStatus::Registered, true).await;
        let ben = attendee(&f, "Ben", SubscriptionStatus::Registered, true).await;
        f.mailer
            .failing
            .lock()
            .await
            .insert("ben@example.com".to_string());

        let first = f.scheduler.tick(now()).await;
        let report = only(&first);
        assert_eq!((report.sent, report.failed), (1, 1));
        let ben_target = ReminderTarget {
            event_id: f.event.id,
            user_id: ben,
        };
        assert_eq!(f.store.marker("first", ben_target).await, None);

        f.mailer.failing.lock().await.clear();
        let retry_at = now() + chrono::Duration::seconds(30);
        let second = f.scheduler.tick(retry_at).await;
        let report = only(&second);
        assert_eq!((report.due, report.sent), (1, 1));
        assert_eq!(f.store.marker("first", ben_target).await, Some(true));
    }

    #[tokio::test]
    async fn only_registered_active_users_inside_the_window_are_due() {
        let f = fixture(10).await;
        attendee(&f, "Seated", SubscriptionStatus::Registered, true).await;
        attendee(&f, "Queued", SubscriptionStatus::Waitlisted, true).await;
        attendee(&f, "Gone", SubscriptionStatus::Cancelled, true).await;
        attendee(&f, "Closed", SubscriptionStatus::Registered, false).await;

        assert_eq!(only(&f.scheduler.tick(now()).await).sent, 1);

        // An hour later the event has started; nothing is due any more.
        let later = fixture(10).await;
        attendee(&later, "Seated", SubscriptionStatus::Registered, true).await;
        let an_hour_later = now() + chrono::Duration::hours(1);
        let report = later.scheduler.tick(an_hour_later).await;
        assert_eq!(only(&report).due, 0);
    }

    #[tokio::test]
    async fn existing_pending_marker_is_flagged() {
        let f = fixture(5).await;
        let a = attendee(&f, "Ana", SubscriptionStatus::Registered, true).await;
        let target = ReminderTarget {
            event_id: f.event.id,
            user_id: a,
        };
        f.store.put_marker("first", target, false).await;

        assert_eq!(only(&f.scheduler.tick(now()).await).sent, 1);
        assert_eq!(f.store.marker("first", target).await, Some(true));
    }

    #[tokio::test]
    async fn email_names_the_event_and_date() {
        let f = fixture(10).await;
        attendee(&f, "Ana", SubscriptionStatus::Registered, true).await;
        f.scheduler.tick(now()).await;

        let sent = f.mailer.sent.lock().await;
        let Some(email) = sent.first() else {
            panic!("no email sent");
        };
        assert_eq!(email.to, "ana@example.com");
        assert_eq!(
            email.body,
            "Hi Ana. Remember to attend the event Data science talk on 14/03/2026"
        );
    }
}
