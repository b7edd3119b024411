//! Pending message rows and the seeding sample set.

use serde::{Deserialize, Serialize};

use super::MessageId;

/// A row of the `emails` table.
///
/// A message is eligible for dispatch iff `sent` is false. Once the poller
/// flips the flag it is never selected again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub id: MessageId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sent: bool,
}

impl PendingMessage {
    pub fn is_pending(&self) -> bool {
        !self.sent
    }
}

/// Insert payload: the store assigns the id and defaults `sent` to false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl NewMessage {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// The fixed rows inserted by every seeding cycle.
pub fn sample_messages() -> Vec<NewMessage> {
    (1..=3)
        .map(|n| {
            NewMessage::new(
                format!("test{n}@example.com"),
                format!("Test {n}"),
                format!("This is test message {n}"),
            )
        })
        .collect()
}

/// What to do with a row whose delivery was given up on.
///
/// `Always` は「ベストエフォート、再送しない」方針。
/// `DeliveredOnly` は失敗した行を未送信のまま残し、次の cycle で再挑戦させる。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkPolicy {
    #[default]
    Always,
    DeliveredOnly,
}

impl MarkPolicy {
    pub fn should_mark(self, delivered: bool) -> bool {
        match self {
            MarkPolicy::Always => true,
            MarkPolicy::DeliveredOnly => delivered,
        }
    }
}
