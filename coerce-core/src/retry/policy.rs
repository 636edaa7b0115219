//! Delay between corrective attempts
//!
//! The number of attempts is governed by `max_retries` on the call; this
//! policy only decides how long to wait before re-asking.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff configuration between attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Delay before the first re-ask (milliseconds)
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Base for exponential backoff (e.g., 2.0 for doubling)
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Jitter factor (0.0 to 1.0) to randomize delays
    #[serde(default)]
    pub jitter_factor: f64,
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_exponential_base() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl RetryPolicy {
    /// Re-ask without waiting
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            jitter_factor: 0.0,
        }
    }

    /// Exponential backoff starting at `initial_delay_ms`
    pub fn exponential(initial_delay_ms: u64) -> Self {
        Self {
            initial_delay_ms,
            jitter_factor: 0.1,
            ..Self::immediate()
        }
    }

    /// Delay before re-ask number `retry` (0-based)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        if self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }

        let base_delay =
            self.initial_delay_ms as f64 * self.exponential_base.powi(retry.min(i32::MAX as u32) as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let delay_with_jitter = if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rng.gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }
}
