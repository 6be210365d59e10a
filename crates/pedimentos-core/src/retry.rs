use std::time::Duration;

/// Deterministic exponential backoff for dependent-service invocations.
///
/// Delay after attempt `n` (zero-based) is `min(base * 2^n, cap)`. No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    pub fn should_retry(attempt: u32, max_attempts: u32) -> bool {
        attempt < max_attempts
    }

    /// `should_retry` against this policy's own retry limit.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        Self::should_retry(attempt, self.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30), 2)
    }
}
