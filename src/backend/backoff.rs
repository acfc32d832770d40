//! Exponential backoff between provider attempts.
//!
//! [`BackoffConfig`] computes `min(base_delay * 2^attempt, max_delay)`.
//! There is no jitter: delays are fully deterministic, which keeps retry
//! timing reproducible in tests and logs.

use std::time::Duration;

/// Delay schedule for the dispatcher's retry loop.
///
/// # Example
///
/// ```
/// use protocol_wizard::backend::BackoffConfig;
/// use std::time::Duration;
///
/// let backoff = BackoffConfig::standard();
/// assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(1));
/// assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(2));
/// assert_eq!(backoff.delay_for_attempt(5), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt. Default: 1 second.
    pub base_delay: Duration,

    /// Ceiling for any single delay. Default: 10 seconds.
    pub max_delay: Duration,
}

impl BackoffConfig {
    /// Build a schedule. `max_delay` caps every delay, including the first.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// 1 second base, 10 second ceiling.
    pub fn standard() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10))
    }

    /// No waiting between attempts.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Delay to sleep after failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::standard()
    }
}
