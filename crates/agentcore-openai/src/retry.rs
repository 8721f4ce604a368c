// Retry policy for transient network failures talking to the chat
// completions endpoint. Mirrors the exponential-backoff-with-jitter shape
// used for durable activity retries elsewhere in the stack, scaled down to
// the handful of attempts a single LLM call can tolerate before the caller
// should see an error.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based: the first retry is
    /// `attempt == 1`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base =
            self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(attempt as i32 - 1);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let jitter_range = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-jitter_range..jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_three_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.has_attempts_remaining(1));
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));
    }

    #[test]
    fn delay_grows_exponentially_without_jitter() {
        let policy = RetryPolicy { jitter: 0.0, ..RetryPolicy::default() };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
    }

    #[test]
    fn delay_is_capped_at_max_interval() {
        let policy = RetryPolicy { jitter: 0.0, ..RetryPolicy::default() };
        assert_eq!(policy.delay_for_attempt(10), policy.max_interval);
    }
}
