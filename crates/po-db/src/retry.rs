//! Backoff policy for `Gateway::run_retryable` (spec.md §4.1).
//!
//! Adapted from the teacher's `everruns_durable::reliability::retry::RetryPolicy`:
//! same exponential-with-jitter shape, narrowed to the gateway's fixed
//! contract (5 attempts, 200 ms base, 3.2 s cap) rather than a
//! per-workflow-configurable policy.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
}

impl RetryPolicy {
    /// The Database Gateway's non-transactional retry contract: up to 5
    /// attempts, 200ms · 2^n backoff capped at 3.2s.
    pub fn gateway_default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_millis(3_200),
            backoff_coefficient: 2.0,
        }
    }

    /// Inside a transaction, retries are disabled so failures surface
    /// immediately to the outer caller (spec.md §4.1).
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
        }
    }

    pub fn has_attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the given (1-indexed) retry attempt, with up to 20%
    /// jitter, capped at `max_interval`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_coefficient.powi(attempt.saturating_sub(1) as i32);
        let raw_ms = (self.initial_interval.as_millis() as f64 * exp).min(self.max_interval.as_millis() as f64);
        let jitter = rand::thread_rng().gen_range(0.0..0.2);
        let jittered_ms = raw_ms * (1.0 + jitter);
        Duration::from_millis(jittered_ms.min(self.max_interval.as_millis() as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_default_caps_at_3_2_seconds() {
        let policy = RetryPolicy::gateway_default();
        for attempt in 1..=10 {
            assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(3_200));
        }
    }

    #[test]
    fn gateway_default_grows_monotonically_before_the_cap() {
        let policy = RetryPolicy::gateway_default();
        // Compare floors (without jitter) since jitter can make attempt n+1
        // momentarily smaller than attempt n near the cap.
        let floor = |attempt: u32| {
            let exp = policy.backoff_coefficient.powi(attempt.saturating_sub(1) as i32);
            (policy.initial_interval.as_millis() as f64 * exp).min(policy.max_interval.as_millis() as f64)
        };
        assert!(floor(2) > floor(1));
        assert!(floor(3) > floor(2));
    }

    #[test]
    fn no_retry_allows_exactly_one_attempt() {
        let policy = RetryPolicy::no_retry();
        assert!(policy.has_attempts_remaining(0));
        assert!(!policy.has_attempts_remaining(1));
    }

    #[test]
    fn gateway_default_allows_five_attempts() {
        let policy = RetryPolicy::gateway_default();
        assert!(policy.has_attempts_remaining(4));
        assert!(!policy.has_attempts_remaining(5));
    }
}
