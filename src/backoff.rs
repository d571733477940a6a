//! Bounded exponential backoff between search attempts
//!
//! Failed attempts back off exponentially with random jitter so retries
//! from concurrent workers do not land in lockstep.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

/// Backoff policy applied between failed attempts of one worker
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffPolicy {
    /// Base delay in milliseconds, doubled per attempt
    pub base_delay_ms: u64,
    /// Hard ceiling for a single delay in milliseconds
    pub max_delay_ms: u64,
    /// Upper bound for the random jitter added to each delay
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,   // 5 seconds before the second attempt
            max_delay_ms: 120_000,  // never sleep longer than 2 minutes
            jitter_ms: 3_000,       // up to 3 seconds of jitter
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after the given failed attempt (0-based).
    ///
    /// `min(max_delay, base * 2^attempt + jitter)`; the exponent is capped so
    /// the multiplication cannot overflow at absurd attempt numbers.
    pub fn delay(&self, attempt: u32) -> Duration {
        let doubled = self.base_delay_ms.saturating_mul(2u64.pow(attempt.min(20)));
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(doubled.saturating_add(jitter).min(self.max_delay_ms))
    }

    /// Sleep for the computed delay.
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay(attempt);
        debug!("Backing off {}ms after attempt {}", delay.as_millis(), attempt + 1);
        sleep(delay).await;
    }
}
