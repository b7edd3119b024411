//! Retry wrapper around fallible async operations.
//!
//! Store connects escalate when attempts run out; mail delivery gives up and
//! logs. Which one happens is decided by [`RetryPolicy::on_exhausted`], and
//! exactly one of them happens.

mod policy;

pub use policy::{
    Backoff, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY, DEFAULT_DELIVERY_ATTEMPTS,
    DEFAULT_DELIVERY_BASE_DELAY, Exhaustion, RetryPolicy,
};

use std::fmt::Display;
use std::future::Future;

use thiserror::Error;
use tracing::{debug, error, warn};

/// Returned when every attempt failed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("{label}: escalating after {attempts} failed attempts: {source}")]
    Escalated {
        label: String,
        attempts: u32,
        #[source]
        source: E,
    },

    #[error("{label}: gave up after {attempts} failed attempts: {source}")]
    GaveUp {
        label: String,
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Escalated { attempts, .. } | RetryError::GaveUp { attempts, .. } => *attempts,
        }
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self, RetryError::Escalated { .. })
    }

    /// The error of the last attempt.
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Escalated { source, .. } | RetryError::GaveUp { source, .. } => source,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            RetryError::Escalated { source, .. } | RetryError::GaveUp { source, .. } => source,
        }
    }
}

/// Invoke `op` until it succeeds or `policy.max_attempts` is reached.
///
/// `op` receives the 1-indexed attempt number. The wrapper sleeps the
/// scheduled delay between attempts, never after the last one.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts {
            let label = label.to_string();
            return Err(match policy.on_exhausted {
                Exhaustion::Escalate => {
                    error!(%label, attempts = attempt, error = %err, "retries exhausted, escalating");
                    RetryError::Escalated {
                        label,
                        attempts: attempt,
                        source: err,
                    }
                }
                Exhaustion::GiveUp => {
                    error!(%label, attempts = attempt, error = %err, "retries exhausted, giving up");
                    RetryError::GaveUp {
                        label,
                        attempts: attempt,
                        source: err,
                    }
                }
            });
        }

        let delay = policy.next_delay(attempt);
        warn!(
            label,
            attempt,
            remaining = max_attempts - attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
