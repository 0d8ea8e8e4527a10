//! Retry policy: decides retry vs terminal failure, and the delay before a
//! retried task becomes eligible again.

use std::time::Duration;

/// Upper bound for a single retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// What happens to a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Back to pending, eligible after `delay`.
    Retry { delay: Duration },

    /// Retries exhausted.
    GiveUp,
}

/// Retry policy for failed tasks.
///
/// The default has a zero base delay: a failed task is eligible again
/// immediately. A non-zero base delay gives exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl RetryPolicy {
    /// Retry as soon as an admission slot is free.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub fn exponential(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
        }
    }

    /// Delay before retry number `retry_count` (1-indexed):
    /// `base_delay * multiplier^(retry_count - 1)`.
    ///
    /// Example with base_delay=2s, multiplier=2.0:
    /// - retry 1: 2s
    /// - retry 2: 4s
    /// - retry 3: 8s
    ///
    /// Capped at `MAX_RETRY_DELAY`.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs)
            .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
    }

    /// Decide the next step for a task that has just failed, given its
    /// already-incremented `retry_count`.
    pub fn decide(&self, retry_count: u32, max_retries: u32) -> RetryDecision {
        if retry_count < max_retries {
            RetryDecision::Retry {
                delay: self.next_delay(retry_count),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}
