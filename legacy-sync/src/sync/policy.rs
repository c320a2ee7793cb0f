//! Retry policy and backoff computation

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds for attempts, batching and gateway calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before a job is marked failed
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_backoff: Duration,
    /// Upper bound for any retry delay
    pub max_backoff: Duration,
    /// Jobs claimed per batch
    pub batch_size: u32,
    /// Bound for one legacy gateway call
    pub gateway_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            batch_size: 25,
            gateway_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `attempt` failed attempts
    ///
    /// `min(initial * 2^(attempt - 1), max)`; attempt 0 is treated as 1.
    ///
    /// ```rust
    /// use legacy_sync::sync::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(1), Duration::from_millis(200));
    /// assert_eq!(policy.backoff(3), Duration::from_millis(800));
    /// assert_eq!(policy.backoff(20), Duration::from_secs(10));
    /// ```
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }

    /// Check whether `attempts` has used up the budget
    #[must_use]
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Batch size as a `usize`
    #[must_use]
    pub fn batch_limit(&self) -> usize {
        usize::try_from(self.batch_size).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_backoff_sequence() {
        let policy = RetryPolicy::default();
        let delays: Vec<u128> = (1..=7).map(|n| policy.backoff(n).as_millis()).collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 3200, 6400, 10_000]);
    }

    #[test]
    fn test_backoff_zero_attempts_uses_initial() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(200));
    }

    #[test]
    fn test_backoff_capped_for_huge_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_is_exhausted() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
        assert!(policy.is_exhausted(6));
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_bounded(n in 0u32..200) {
            let policy = RetryPolicy::default();
            prop_assert!(policy.backoff(n) <= policy.backoff(n + 1));
            prop_assert!(policy.backoff(n) <= policy.max_backoff);
            prop_assert!(policy.backoff(n) >= policy.initial_backoff);
        }
    }
}
