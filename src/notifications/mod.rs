//! Notification dispatch: job payloads, the in-process queue and email
//! delivery.
//!
//! The subscription service only sees [`NotificationSink`]. Enqueueing is
//! fire-and-forget: delivery, retries and failures are the queue's
//! business and never feed back into the caller's transaction.

pub mod job;
pub mod mailer;
pub mod queue;

use std::fmt;

use async_trait::async_trait;

use crate::domain::JobId;

pub use job::{NotificationJob, OutgoingEmail};
pub use mailer::{LogMailer, MailError, Mailer, SmtpMailer, SmtpSettings};
pub use queue::{JobState, JobStatus, NotificationQueue, QueuePolicy, QueueStats};

/// Errors returned when a job cannot be accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    /// The queue is at capacity.
    #[error("notification queue is full")]
    QueueFull,

    /// The worker has stopped.
    #[error("notification queue is closed")]
    QueueClosed,
}

/// Accepts notification jobs for asynchronous delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync + fmt::Debug {
    /// Hands a job over for delivery and returns its id without waiting
    /// for the outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] if the job was not accepted.
    async fn enqueue(&self, job: NotificationJob) -> Result<JobId, NotifyError>;
}
