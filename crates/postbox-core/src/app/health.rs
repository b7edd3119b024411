//! Store readiness shared by the poller, the seeder and startup.

use tracing::{info, warn};

use crate::domain::FatalError;
use crate::ports::MessageStore;
use crate::retry::{RetryError, RetryPolicy, retry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Reconnect gave up without escalating; skip this cycle.
    Skipped,
}

/// Connect under `policy`, turning escalation into a [`FatalError`].
pub async fn connect_with_retry(
    store: &dyn MessageStore,
    policy: &RetryPolicy,
) -> Result<Readiness, FatalError> {
    match retry(policy, "store connect", |_| store.connect()).await {
        Ok(()) => {
            info!("connected to store");
            Ok(Readiness::Ready)
        }
        Err(RetryError::Escalated {
            attempts, source, ..
        }) => Err(FatalError::StoreUnavailable { attempts, source }),
        Err(RetryError::GaveUp { .. }) => Ok(Readiness::Skipped),
    }
}

/// Health-check the session and reconnect if it is unusable.
pub async fn ensure_store_ready(
    store: &dyn MessageStore,
    policy: &RetryPolicy,
) -> Result<Readiness, FatalError> {
    match store.health_check().await {
        Ok(()) => Ok(Readiness::Ready),
        Err(err) => {
            warn!(kind = ?err.kind(), error = %err, "store health check failed, reconnecting");
            connect_with_retry(store, policy).await
        }
    }
}
