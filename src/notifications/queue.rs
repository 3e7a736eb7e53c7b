//! Bounded in-process job queue with a retrying delivery worker.
//!
//! [`NotificationQueue`] wraps a [`tokio::sync::mpsc`] channel. Producers
//! call [`NotificationSink::enqueue`], which never waits: a full or closed
//! channel is reported immediately. The worker spawned by
//! [`NotificationQueue::start`] hands each job to its own delivery task,
//! which retries failed sends with exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use super::{Mailer, NotificationJob, NotificationSink, NotifyError};
use crate::domain::JobId;

/// Retry policy and sizing of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Channel capacity; enqueueing fails beyond it.
    pub capacity: usize,
    /// Delivery attempts per job, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub backoff: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            max_attempts: 3,
            backoff: Duration::from_millis(1_000),
        }
    }
}

impl QueuePolicy {
    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn retry_delay(&self, failed_attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(failed_attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor)
    }
}

/// Lifecycle state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// In the channel, not picked up yet.
    Waiting,
    /// A delivery attempt is running.
    Active,
    /// Last attempt failed; waiting for the backoff to elapse.
    Delayed,
    /// All attempts failed.
    Failed,
}

/// Snapshot of one job. Completed jobs are dropped from tracking.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobStatus {
    /// Job identifier.
    pub id: JobId,
    /// Job type name.
    pub kind: String,
    /// Current state.
    pub state: JobState,
    /// Attempts finished so far.
    pub attempts_made: u32,
    /// Error of the last failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
}

/// Aggregate queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct QueueStats {
    /// Jobs accepted but not yet picked up.
    pub waiting: u64,
    /// Jobs currently being delivered or backing off.
    pub active: u64,
    /// Jobs delivered.
    pub completed: u64,
    /// Jobs that exhausted their attempts.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    waiting: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Default)]
struct Shared {
    counters: Counters,
    jobs: RwLock<HashMap<JobId, JobStatus>>,
}

impl Shared {
    async fn update(&self, id: JobId, f: impl FnOnce(&mut JobStatus)) {
        if let Some(status) = self.jobs.write().await.get_mut(&id) {
            f(status);
        }
    }
}

#[derive(Debug)]
struct QueuedJob {
    id: JobId,
    job: NotificationJob,
}

/// Producer handle of the notification queue.
///
/// Cloning is cheap; all clones feed the same worker.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<QueuedJob>,
    shared: Arc<Shared>,
}

impl NotificationQueue {
    /// Creates the queue and spawns its worker on the current runtime.
    ///
    /// The worker stops once every [`NotificationQueue`] clone has been
    /// dropped and the channel is drained.
    #[must_use]
    pub fn start(policy: QueuePolicy, mailer: Arc<dyn Mailer>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(policy.capacity.max(1));
        let shared = Arc::new(Shared::default());
        let worker = tokio::spawn(run_worker(receiver, mailer, Arc::clone(&shared), policy));
        (Self { sender, shared }, worker)
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let c = &self.shared.counters;
        QueueStats {
            waiting: c.waiting.load(Ordering::Relaxed),
            active: c.active.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Returns the tracked state of a job; `None` once it completed or if
    /// it never existed.
    pub async fn job_status(&self, id: JobId) -> Option<JobStatus> {
        self.shared.jobs.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl NotificationSink for NotificationQueue {
    async fn enqueue(&self, job: NotificationJob) -> Result<JobId, NotifyError> {
        let id = JobId::new();
        let status = JobStatus {
            id,
            kind: job.kind().to_string(),
            state: JobState::Waiting,
            attempts_made: 0,
            failed_reason: None,
        };
        self.shared.jobs.write().await.insert(id, status);
        self.shared.counters.waiting.fetch_add(1, Ordering::Relaxed);

        match self.sender.try_send(QueuedJob { id, job }) {
            Ok(()) => {
                tracing::debug!(job_id = %id, "notification enqueued");
                Ok(id)
            }
            Err(err) => {
                self.shared.counters.waiting.fetch_sub(1, Ordering::Relaxed);
                self.shared.jobs.write().await.remove(&id);
                Err(match err {
                    mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => NotifyError::QueueClosed,
                })
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<QueuedJob>,
    mailer: Arc<dyn Mailer>,
    shared: Arc<Shared>,
    policy: QueuePolicy,
) {
    while let Some(queued) = receiver.recv().await {
        shared.counters.waiting.fetch_sub(1, Ordering::Relaxed);
        shared.counters.active.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(deliver(
            queued,
            Arc::clone(&mailer),
            Arc::clone(&shared),
            policy,
        ));
    }
    tracing::info!("notification worker stopped");
}

async fn deliver(
    queued: QueuedJob,
    mailer: Arc<dyn Mailer>,
    shared: Arc<Shared>,
    policy: QueuePolicy,
) {
    let QueuedJob { id, job } = queued;
    let email = job.render();
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        shared.update(id, |s| s.state = JobState::Active).await;

        let err = match mailer.send(&email).await {
            Ok(()) => {
                shared.jobs.write().await.remove(&id);
                shared.counters.active.fetch_sub(1, Ordering::Relaxed);
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    job_id = %id,
                    kind = job.kind(),
                    to = %email.to,
                    attempt,
                    "notification delivered"
                );
                return;
            }
            Err(err) => err.to_string(),
        };

        if attempt == max_attempts {
            shared
                .update(id, |s| {
                    s.state = JobState::Failed;
                    s.attempts_made = attempt;
                    s.failed_reason = Some(err.clone());
                })
                .await;
            shared.counters.active.fetch_sub(1, Ordering::Relaxed);
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                job_id = %id,
                kind = job.kind(),
                to = %email.to,
                attempt,
                error = %err,
                "notification failed permanently"
            );
            return;
        }

        let delay = policy.retry_delay(attempt);
        tracing::warn!(
            job_id = %id,
            attempt,
            retry_in_ms = delay.as_millis(),
            error = %err,
            "notification attempt failed"
        );
        shared
            .update(id, |s| {
                s.state = JobState::Delayed;
                s.attempts_made = attempt;
                s.failed_reason = Some(err);
            })
            .await;
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::notifications::{MailError, OutgoingEmail};
    use std::sync::atomic::AtomicU32;

    /// Fails the first `failures` sends, then succeeds.
    #[derive(Debug, Default)]
    struct FlakyMailer {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), MailError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(MailError::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn job() -> NotificationJob {
        NotificationJob::SubscriptionCreated {
            creator_email: "org@example.com".to_string(),
            creator_name: "Org".to_string(),
            event_name: "Meetup".to_string(),
            subscriber_name: "Sam".to_string(),
        }
    }

    fn fast_policy(max_attempts: u32) -> QueuePolicy {
        QueuePolicy {
            capacity: 8,
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    async fn wait_until(
        queue: &NotificationQueue,
        done: impl Fn(QueueStats) -> bool,
    ) -> QueueStats {
        for _ in 0..500 {
            let stats = queue.stats();
            if done(stats) {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("queue did not settle: {:?}", queue.stats());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = QueuePolicy::default();
        assert_eq!(policy.retry_delay(1), Duration::from_millis(1_000));
        assert_eq!(policy.retry_delay(2), Duration::from_millis(2_000));
        assert_eq!(policy.retry_delay(3), Duration::from_millis(4_000));
    }

    #[tokio::test]
    async fn delivers_after_transient_failures() {
        let mailer = Arc::new(FlakyMailer {
            failures: 2,
            ..FlakyMailer::default()
        });
        let (queue, _worker) =
            NotificationQueue::start(fast_policy(3), Arc::clone(&mailer) as Arc<dyn Mailer>);

        let Ok(id) = queue.enqueue(job()).await else {
            panic!("enqueue failed");
        };
        let stats = wait_until(&queue, |s| s.completed == 1).await;
        assert_eq!(stats.failed, 0);
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
        assert!(queue.job_status(id).await.is_none());
    }

    #[tokio::test]
    async fn exhausted_job_is_kept_as_failed() {
        let mailer = Arc::new(FlakyMailer {
            failures: u32::MAX,
            ..FlakyMailer::default()
        });
        let (queue, _worker) =
            NotificationQueue::start(fast_policy(2), Arc::clone(&mailer) as Arc<dyn Mailer>);

        let Ok(id) = queue.enqueue(job()).await else {
            panic!("enqueue failed");
        };
        let stats = wait_until(&queue, |s| s.failed == 1).await;
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.active, 0);
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 2);

        let Some(status) = queue.job_status(id).await else {
            panic!("failed job should stay tracked");
        };
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempts_made, 2);
        assert!(status.failed_reason.is_some());
    }

    #[tokio::test]
    async fn closed_queue_rejects_without_waiting() {
        let (queue, worker) =
            NotificationQueue::start(fast_policy(1), Arc::new(FlakyMailer::default()));
        worker.abort();
        let _ = worker.await;

        assert!(matches!(
            queue.enqueue(job()).await,
            Err(NotifyError::QueueClosed)
        ));
        assert_eq!(queue.stats().waiting, 0);
    }
}
