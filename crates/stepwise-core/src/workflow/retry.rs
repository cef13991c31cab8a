//! Retry decisions and backoff delays for step execution.
//!
//! Stateless: every function takes the step's `RetryConfig`. The engine asks
//! `should_retry` after each failed attempt and sleeps for `backoff_delay`
//! before the next one.

use std::time::Duration;

use rand::Rng;
use stepwise_types::workflow::RetryConfig;

/// Stateless retry handler for workflow step failures.
pub struct RetryHandler;

impl RetryHandler {
    /// Determine whether another attempt is allowed.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn should_retry(config: &RetryConfig, attempt: u32) -> bool {
        attempt < config.max_attempts
    }

    /// Delay before retry number `retry` (1-based: the delay between
    /// attempt 1 and attempt 2 is retry 1).
    pub fn backoff_delay(config: &RetryConfig, retry: u32) -> Duration {
        let base = Self::base_delay_ms(config, retry);
        let millis = if config.jitter && base > 0.0 {
            base * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            base
        };
        Duration::from_millis(millis.round() as u64)
    }

    /// Un-jittered delay: `min(initial * factor^(retry-1), max)`.
    fn base_delay_ms(config: &RetryConfig, retry: u32) -> f64 {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let grown = config.initial_delay_ms as f64 * config.backoff_factor.powi(exponent);
        let max = config.max_delay_ms as f64;
        if grown.is_finite() { grown.min(max) } else { max }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
