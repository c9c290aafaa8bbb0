use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounded exponential backoff for transient provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_ms: 1_000,
            cap_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_ms: 0,
            cap_ms: 0,
        }
    }

    /// Ceiling for the wait after the `failed`-th failure (1-based).
    pub fn ceiling(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1).min(20);
        let ms = self.base_ms.saturating_mul(1u64 << exp).min(self.cap_ms);
        Duration::from_millis(ms)
    }

    /// Wait with jitter in the upper half of the ceiling.
    pub fn backoff(&self, failed: u32) -> Duration {
        let ceiling = self.ceiling(failed).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let half = ceiling / 2;
        Duration::from_millis(half + rand::thread_rng().gen_range(0..=ceiling - half))
    }

    pub fn has_attempts_left(&self, used: u32) -> bool {
        used < self.max_attempts.max(1)
    }
}
