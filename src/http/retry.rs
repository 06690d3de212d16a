//! Retry configuration and backoff.

use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Whether failed requests are retried at all.
    pub enabled: bool,
    /// Maximum number of retry attempts (not counting the initial request).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay, jitter included.
    pub max_delay: Duration,
    /// Jitter as a fraction of the computed delay (`0.2` = ±20%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given max retries.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Exponential delay before jitter for a given retry (0-indexed):
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as f64 * 2f64.powi(attempt.min(30) as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Jittered delay for a given retry (0-indexed). Always within
    /// `[1 - jitter, 1 + jitter]` of [`base_delay_for_attempt`](Self::base_delay_for_attempt)
    /// and never above `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let capped = self.base_delay_for_attempt(attempt).as_millis() as f64;
        let factor = 1.0 + (rand::random::<f64>() * 2.0 - 1.0) * self.jitter;
        let jittered = (capped * factor)
            .min(self.max_delay.as_millis() as f64)
            .max(0.0);
        Duration::from_millis(jittered.round() as u64)
    }

    /// Server errors and rate limiting are worth retrying.
    pub fn is_retryable_status(status: u16) -> bool {
        status >= 500 || status == 429
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_base_delay_grows_exponentially() {
        let config = RetryConfig::default();
        assert_eq!(config.base_delay_for_attempt(0).as_millis(), 1_000);
        assert_eq!(config.base_delay_for_attempt(1).as_millis(), 2_000);
        assert_eq!(config.base_delay_for_attempt(2).as_millis(), 4_000);
    }

    #[test]
    fn test_base_delay_caps_at_max() {
        let config = RetryConfig::default();
        assert_eq!(config.base_delay_for_attempt(5).as_millis(), 30_000);
        assert_eq!(config.base_delay_for_attempt(u32::MAX).as_millis(), 30_000);
    }

    #[test]
    fn test_jittered_delay_stays_in_bounds() {
        let config = RetryConfig::default();
        for attempt in 0..8 {
            let base = config.base_delay_for_attempt(attempt).as_millis() as f64;
            for _ in 0..200 {
                let d = config.delay_for_attempt(attempt).as_millis() as f64;
                assert!(d >= (base * 0.8).floor(), "attempt {attempt}: {d} < 0.8 * {base}");
                assert!(d <= (base * 1.2).ceil(), "attempt {attempt}: {d} > 1.2 * {base}");
                assert!(d <= 30_000.0);
            }
        }
    }

    #[test]
    fn test_no_jitter_is_exact() {
        let config = RetryConfig::default()
            .with_base_delay(Duration::from_millis(100))
            .with_jitter(0.0);
        assert_eq!(config.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(config.delay_for_attempt(3).as_millis(), 800);
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [500, 502, 503, 504, 429] {
            assert!(RetryConfig::is_retryable_status(status));
        }
        for status in [400, 401, 403, 404, 409] {
            assert!(!RetryConfig::is_retryable_status(status));
        }
    }
}
