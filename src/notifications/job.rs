//! Notification job payloads and their rendering into emails.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A unit of work for the notification worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationJob {
    /// Tells an event's organizer that someone registered.
    SubscriptionCreated {
        /// Organizer address.
        creator_email: String,
        /// Organizer display name.
        creator_name: String,
        /// Event display name.
        event_name: String,
        /// Display name of the new attendee.
        subscriber_name: String,
    },
}

impl NotificationJob {
    /// Stable job type name used in logs and job status.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SubscriptionCreated { .. } => "subscription_created",
        }
    }

    /// Renders the email this job delivers.
    #[must_use]
    pub fn render(&self) -> OutgoingEmail {
        match self {
            Self::SubscriptionCreated {
                creator_email,
                creator_name,
                event_name,
                subscriber_name,
            } => OutgoingEmail {
                to: creator_email.clone(),
                subject: format!("New subscription for {event_name}"),
                body: format!(
                    "Hi {creator_name},\n\n{subscriber_name} just subscribed to your event {event_name}."
                ),
            },
        }
    }
}

/// A plain-text email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_created_goes_to_the_organizer() {
        let job = NotificationJob::SubscriptionCreated {
            creator_email: "org@example.com".to_string(),
            creator_name: "Olga".to_string(),
            event_name: "Robotics fair".to_string(),
            subscriber_name: "Sam".to_string(),
        };
        let email = job.render();
        assert_eq!(email.to, "org@example.com");
        assert_eq!(email.subject, "New subscription for Robotics fair");
        assert!(email.body.contains("Sam just subscribed"));
        assert_eq!(job.kind(), "subscription_created");
    }

    #[test]
    fn serializes_with_type_tag() {
        let job = NotificationJob::SubscriptionCreated {
            creator_email: "a@b.c".to_string(),
            creator_name: "A".to_string(),
            event_name: "E".to_string(),
            subscriber_name: "S".to_string(),
        };
        let json = serde_json::to_value(&job).unwrap_or_default();
        assert_eq!(json["type"], "subscription_created");
        assert_eq!(json["event_name"], "E");
    }
}
