//! Retry policy with exponential backoff.
//!
//! Only transient provider failures are retried, and only before any output
//! has reached the caller. The decision lives in the controller; this module
//! owns the numbers.

use std::time::Duration;

use mailmate_config::RetryConfig;
use mailmate_core::ProviderError;

/// How many attempts a request gets and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// A single attempt, never retried.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Whether another attempt is allowed after `attempts` have failed.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Backoff after `attempts` failures: base, 2×base, 4×base, ... capped.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let doublings = attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }

    /// Delay before the next attempt, raised to any provider-requested wait
    /// and then capped at `max_delay`.
    pub fn delay_after(&self, attempts: u32, err: &ProviderError) -> Duration {
        let backoff = self.backoff(attempts);
        match err.retry_after() {
            Some(wait) => backoff.max(wait).min(self.max_delay),
            None => backoff,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(500), Duration::from_secs(3));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_secs(3));
        assert_eq!(policy.backoff(40), Duration::from_secs(3));
    }

    #[test]
    fn attempt_budget_counts_the_first_attempt() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!RetryPolicy::none().allows_retry(1));
    }

    #[test]
    fn rate_limit_wait_is_honoured_within_cap() {
        let policy = RetryPolicy::default();
        let err = ProviderError::RateLimited { retry_after_secs: 2 };
        assert_eq!(policy.delay_after(1, &err), Duration::from_secs(2));

        let err = ProviderError::RateLimited { retry_after_secs: 120 };
        assert_eq!(policy.delay_after(1, &err), Duration::from_secs(8));

        let err = ProviderError::Timeout("slow".into());
        assert_eq!(policy.delay_after(2, &err), Duration::from_secs(1));
    }

    #[test]
    fn from_config() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 900,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_millis(900));
    }
}
