use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::Result;

/// Bounded exponential backoff template
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct BackoffPolicy {
    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random spread applied to every delay, in percent of the delay
    #[serde(default = "default_jitter_percent")]
    pub jitter_percent: u8,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_percent: default_jitter_percent(),
        }
    }
}

impl BackoffPolicy {
    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(config_error(format!("{name} base_delay_ms must be > 0")));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(config_error(format!(
                "{} max_delay_ms {} must be >= base_delay_ms {}",
                name, self.max_delay_ms, self.base_delay_ms
            )));
        }
        if self.jitter_percent > 100 {
            return Err(config_error(format!("{name} jitter_percent must be <= 100")));
        }
        Ok(())
    }

    /// Delay before the given attempt (0-based), doubled per attempt and capped
    /// at `max_delay_ms`, without jitter.
    pub fn delay_for(
        &self,
        attempt: u32,
    ) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// `delay_for` with the configured random spread applied.
    pub fn jittered_delay_for(
        &self,
        attempt: u32,
    ) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter_percent == 0 {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        let spread = millis * self.jitter_percent as u64 / 100;
        if spread == 0 {
            return delay;
        }
        let low = millis.saturating_sub(spread);
        let high = millis.saturating_add(spread).min(self.max_delay_ms.max(low));
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}

/// Retry strategies by concern
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RetryPolicies {
    /// Observer relist after a failed list or a broken watch stream
    #[serde(default)]
    pub relist: BackoffPolicy,
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.relist.validate("relist")
    }
}

fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_jitter_percent() -> u8 {
    20
}
