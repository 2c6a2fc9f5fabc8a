//! Reconnect backoff for the bridge subscription.
//!
//! Exponential with full jitter: `random(0, min(max_delay, base_delay * 2^attempt))`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Reconnect backoff parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Base delay in ms (default: 1000)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Delay cap in ms (default: 30000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { base_delay_ms: DEFAULT_BASE_DELAY_MS, max_delay_ms: DEFAULT_MAX_DELAY_MS }
    }
}

impl BackoffConfig {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base_delay_ms: base.as_millis() as u64, max_delay_ms: max.as_millis() as u64 }
    }

    /// Upper bound of the delay before retry number `attempt` (zero-based)
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay_ms.saturating_mul(1u64 << attempt.min(31));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }

    /// Delay before retry number `attempt`, uniformly drawn from `[0, ceiling]`
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }
}
