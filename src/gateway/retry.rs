use rand::Rng;
use std::time::Duration;

/// Exponential backoff bounded by attempt count and total wait.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts for transient failures, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each following one
    pub backoff_base: Duration,
    /// Upper bound on the sum of all backoff sleeps of one call
    pub max_total_wait: Duration,
    /// Extra random delay as a fraction of the computed backoff
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            max_total_wait: Duration::from_secs(60),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy without delays, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base: Duration::from_millis(1),
            max_total_wait: Duration::from_secs(5),
            jitter: 0.0,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let base = self.backoff_base.saturating_mul(1 << exponent);
        if self.jitter <= 0.0 {
            return base;
        }
        let extra = rand::rng().random_range(0.0..=self.jitter);
        base + base.mul_f64(extra)
    }
}
