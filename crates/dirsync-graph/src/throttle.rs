//! Retry policy for throttled and transient Graph responses.
//!
//! 429 responses honour `Retry-After` (seconds); responses without the header
//! and 502/503/504 fall back to exponential backoff with jitter.

use std::time::Duration;
use tracing::warn;

/// Retry and backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum retries per request (default: 5).
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds (default: 1000ms).
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 60000ms).
    pub max_delay_ms: u64,
    /// Jitter factor as a fraction of delay (default: 0.25).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Short delays for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
            jitter_factor: 0.0,
        }
    }

    /// Validates the policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be > 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms must be >= base_delay_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("jitter_factor must be in range [0.0, 1.0]".to_string());
        }
        Ok(())
    }

    /// Parses a `Retry-After` header value in seconds.
    #[must_use]
    pub fn parse_retry_after(header_value: &str) -> Option<u64> {
        header_value.trim().parse::<u64>().ok()
    }

    /// Exponential delay for the given attempt, capped at `max_delay_ms`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64;
        let max = self.max_delay_ms as f64;
        let delay_ms = (base * 2_f64.powi(attempt.min(30) as i32)).min(max);
        Duration::from_millis(delay_ms as u64)
    }

    /// Adds up to `jitter_factor` of random jitter to a delay.
    #[must_use]
    pub fn add_jitter(&self, delay: Duration) -> Duration {
        use rand::Rng;

        if self.jitter_factor == 0.0 {
            return delay;
        }
        let delay_ms = delay.as_millis() as f64;
        let jitter = rand::thread_rng().gen_range(0.0..=delay_ms * self.jitter_factor);
        Duration::from_millis((delay_ms + jitter) as u64)
    }

    /// Delay before the next attempt.
    #[must_use]
    pub fn delay_for(&self, retry_after_secs: Option<u64>, attempt: u32) -> Duration {
        match retry_after_secs {
            Some(secs) => {
                let capped = Duration::from_secs(secs).min(Duration::from_millis(self.max_delay_ms));
                if capped.as_secs() < secs {
                    warn!(
                        retry_after = secs,
                        capped_ms = self.max_delay_ms,
                        "Retry-After exceeds maximum delay, capping"
                    );
                }
                capped
            }
            None => self.add_jitter(self.backoff_delay(attempt)),
        }
    }
}
