//! Retry policy and backoff calculation.
//!
//! Exponential backoff here is exact: `delay = backoffMs * 2^attempt`, no
//! jitter. A prior version of this module (see the teacher's
//! `RetryStrategy::Exponential`) added jitter by default; it's dropped here
//! because the engine's retry-delay property must be exactly reproducible
//! for a given `(backoffMs, attempt)` pair.

use serde::{Deserialize, Serialize};

/// Per-task retry budget and base backoff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(rename = "maxRetries")]
    pub max_retries: u32,
    #[serde(rename = "backoffMs")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
        }
    }

    /// Delay before the attempt numbered `attempt` (0-indexed: the first
    /// retry is `attempt == 0`). Grows as `backoffMs * 2^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let multiplier: u64 = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self.backoff_ms.saturating_mul(multiplier);
        std::time::Duration::from_millis(millis)
    }

    /// Whether another attempt is allowed after `attempts_so_far` failures.
    pub fn allows_retry(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_retries
    }
}

/// Tracks retry progress for one task's in-flight execution.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_each_attempt() {
        let policy = RetryPolicy::new(5, 100);
        assert_eq!(policy.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(policy.delay_for_attempt(1).as_millis(), 200);
        assert_eq!(policy.delay_for_attempt(2).as_millis(), 400);
        assert_eq!(policy.delay_for_attempt(3).as_millis(), 800);
    }

    #[test]
    fn retry_budget_is_exhausted_at_max_retries() {
        let policy = RetryPolicy::new(2, 50);
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
    }

    #[test]
    fn zero_backoff_stays_zero() {
        let policy = RetryPolicy::new(3, 0);
        assert_eq!(policy.delay_for_attempt(10).as_millis(), 0);
    }

    proptest::proptest! {
        #[test]
        fn backoff_is_monotonically_nondecreasing_across_attempts(
            backoff_ms in 0u64..10_000,
            attempt in 0u32..20,
        ) {
            let policy = RetryPolicy::new(u32::MAX, backoff_ms);
            let this = policy.delay_for_attempt(attempt);
            let next = policy.delay_for_attempt(attempt + 1);
            proptest::prop_assert!(next >= this);
        }

        #[test]
        fn backoff_matches_the_closed_form(backoff_ms in 0u64..1_000, attempt in 0u32..10) {
            let policy = RetryPolicy::new(u32::MAX, backoff_ms);
            let expected = backoff_ms.saturating_mul(2u64.saturating_pow(attempt));
            proptest::prop_assert_eq!(policy.delay_for_attempt(attempt).as_millis(), expected as u128);
        }
    }
}
