//! Retry policy: decides backoff delays and what happens once attempts run out.

use std::time::Duration;

pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_DELIVERY_ATTEMPTS: u32 = 5;
pub const DEFAULT_DELIVERY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),

    /// Delay doubles after each failure, starting from `base`.
    Exponential { base: Duration },
}

/// Action taken once every attempt has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// 呼び出し元に致命的エラーとして返す（プロセス終了につながる）
    Escalate,
    /// ログに残して諦める
    GiveUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first one.
    pub max_attempts: u32,

    pub backoff: Backoff,

    pub on_exhausted: Exhaustion,
}

impl RetryPolicy {
    /// Store connection: fixed delay, escalate when exhausted.
    pub fn store_connect(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
            on_exhausted: Exhaustion::Escalate,
        }
    }

    /// Mail delivery: exponential backoff, give up when exhausted.
    pub fn delivery(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base: base_delay },
            on_exhausted: Exhaustion::GiveUp,
        }
    }

    /// Calculate the delay before the next attempt.
    ///
    /// # Arguments
    /// * `attempts` - Number of attempts already made (1-indexed).
    ///
    /// Exponential backoff uses `base * 2^(attempts - 1)`. With base=1s:
    /// - after attempt 1: 1s
    /// - after attempt 2: 2s
    /// - after attempt 3: 4s
    /// - after attempt 4: 8s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base } => {
                let exponent = attempts.saturating_sub(1);
                let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::delivery(DEFAULT_DELIVERY_ATTEMPTS, DEFAULT_DELIVERY_BASE_DELAY)
    }
}
