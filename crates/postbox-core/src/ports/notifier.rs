//! Notifier port - outbound mail relay

use async_trait::async_trait;

use crate::domain::{DeliveryError, OutgoingMail};

/// Notifier hands a mail to a relay.
///
/// Acceptance by the relay is the only confirmation; bounces and delivery
/// receipts are not tracked.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError>;
}
