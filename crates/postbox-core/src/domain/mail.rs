//! Outgoing mail and the template that renders it from a row.

use serde::{Deserialize, Serialize};

use super::PendingMessage;

pub const DEFAULT_FROM: &str = "noreply@example.com";
pub const DEFAULT_SUBJECT_PREFIX: &str = "Data available in the database: ";
pub const DEFAULT_BODY_PREFIX: &str =
    "Records matching the condition were found in the database. data: ";

/// A fully rendered mail, ready to be handed to a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailTemplate {
    pub from: String,
    pub subject_prefix: String,
    pub body_prefix: String,
}

impl MailTemplate {
    pub fn render(&self, message: &PendingMessage) -> OutgoingMail {
        OutgoingMail {
            from: self.from.clone(),
            to: message.recipient.clone(),
            subject: format!("{}{}", self.subject_prefix, message.subject),
            body: format!("{}{}", self.body_prefix, message.body),
        }
    }
}

impl Default for MailTemplate {
    fn default() -> Self {
        Self {
            from: DEFAULT_FROM.to_string(),
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            body_prefix: DEFAULT_BODY_PREFIX.to_string(),
        }
    }
}
