//! RecordingNotifier - 開発・テスト用の Notifier
//!
//! 受け付けた mail を記録するだけで、実際には送信しない。
//! 失敗をスクリプトできる（先頭 n 回だけ失敗、常に失敗、特定の宛先だけ失敗）。

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{DeliveryError, OutgoingMail};
use crate::ports::Notifier;

#[derive(Default)]
struct RecordingState {
    accepted: Vec<OutgoingMail>,
    attempts: u32,
    failures_left: u32,
    reject_all: bool,
    rejected_recipients: HashSet<String>,
}

#[derive(Default)]
pub struct RecordingNotifier {
    state: Mutex<RecordingState>,
}

impl RecordingNotifier {
    /// Accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every send.
    pub fn rejecting() -> Self {
        Self {
            state: Mutex::new(RecordingState {
                reject_all: true,
                ..RecordingState::default()
            }),
        }
    }

    /// Rejects the first `n` sends, then accepts.
    pub fn failing_first(n: u32) -> Self {
        Self {
            state: Mutex::new(RecordingState {
                failures_left: n,
                ..RecordingState::default()
            }),
        }
    }

    /// Rejects every send addressed to `recipient`.
    pub async fn reject_recipient(&self, recipient: impl Into<String>) {
        self.state
            .lock()
            .await
            .rejected_recipients
            .insert(recipient.into());
    }

    /// Mails accepted so far, in acceptance order.
    pub async fn accepted(&self) -> Vec<OutgoingMail> {
        self.state.lock().await.accepted.clone()
    }

    /// Number of `send` calls, successful or not.
    pub async fn attempts(&self) -> u32 {
        self.state.lock().await.attempts
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        let mut state = self.state.lock().await;
        state.attempts += 1;

        if state.reject_all || state.rejected_recipients.contains(&mail.to) {
            return Err(DeliveryError::Rejected(format!(
                "550 mailbox unavailable: {}",
                mail.to
            )));
        }
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(DeliveryError::Transport("connection reset by relay".to_string()));
        }

        state.accepted.push(mail.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            from: "noreply@example.com".into(),
            to: to.into(),
            subject: "s".into(),
            body: "b".into(),
        }
    }

    #[tokio::test]
    async fn failing_first_then_accepts() {
        let notifier = RecordingNotifier::failing_first(2);

        assert!(notifier.send(&mail("a@example.com")).await.is_err());
        assert!(notifier.send(&mail("a@example.com")).await.is_err());
        notifier.send(&mail("a@example.com")).await.unwrap();

        assert_eq!(notifier.attempts().await, 3);
        assert_eq!(notifier.accepted().await.len(), 1);
    }

    #[tokio::test]
    async fn rejected_recipient_only_affects_that_address() {
        let notifier = RecordingNotifier::new();
        notifier.reject_recipient("bad@example.com").await;

        assert!(matches!(
            notifier.send(&mail("bad@example.com")).await,
            Err(DeliveryError::Rejected(_))
        ));
        notifier.send(&mail("good@example.com")).await.unwrap();

        let accepted = notifier.accepted().await;
        assert_eq!(accepted, vec![mail("good@example.com")]);
    }
}
