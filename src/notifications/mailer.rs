//! Email delivery backends.
//!
//! [`SmtpMailer`] relays through an SMTP server with `lettre`;
//! [`LogMailer`] writes messages to the tracing log and is the fallback
//! when no SMTP host is configured.

use std::fmt;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::OutgoingEmail;

/// Errors raised while delivering an email.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Sender or recipient address could not be parsed.
    #[error("invalid address {0}")]
    Address(String),

    /// The message could not be assembled.
    #[error("failed to build email: {0}")]
    Build(String),

    /// The SMTP exchange failed.
    #[error("smtp delivery failed: {0}")]
    Transport(String),

    /// The blocking delivery task panicked or was cancelled.
    #[error("email task failed: {0}")]
    Task(String),
}

/// Something that can deliver an [`OutgoingEmail`].
#[async_trait]
pub trait Mailer: Send + Sync + fmt::Debug {
    /// Delivers one email.
    ///
    /// # Errors
    ///
    /// Returns a [`MailError`] if the message could not be delivered.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Mailer that logs instead of sending.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "email (log only)"
        );
        Ok(())
    }
}

/// SMTP connection settings.
#[derive(Clone)]
pub struct SmtpSettings {
    /// Relay host name.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Login user; no authentication when `None`.
    pub user: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Sender address.
    pub from: String,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from)
            .finish()
    }
}

/// Mailer delivering through an SMTP relay.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
    host: String,
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.host)
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Builds the transport. With credentials the connection uses TLS;
    /// without them it talks plain SMTP, which is only suitable for a
    /// local relay.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Address`] if the sender address is invalid
    /// and [`MailError::Transport`] if the TLS relay cannot be set up.
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| MailError::Address(format!("{}: {e}", settings.from)))?;

        let transport = match (&settings.user, &settings.password) {
            (Some(user), Some(password)) => SmtpTransport::relay(&settings.host)
                .map_err(|e| MailError::Transport(format!("smtp relay error: {e}")))?
                .port(settings.port)
                .credentials(Credentials::new(user.clone(), password.clone()))
                .build(),
            _ => SmtpTransport::builder_dangerous(&settings.host)
                .port(settings.port)
                .build(),
        };

        Ok(Self {
            transport,
            from,
            host: settings.host.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| MailError::Address(format!("{}: {e}", email.to)))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || {
            transport
                .send(&message)
                .map_err(|e| MailError::Transport(e.to_string()))
        })
        .await
        .map_err(|e| MailError::Task(e.to_string()))?
        .map(|_| ())
    }
}
