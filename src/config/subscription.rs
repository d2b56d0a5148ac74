use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::Result;

/// Buffering and lifecycle knobs of the subscription core
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubscriptionConfig {
    /// Capacity of the gRPC response channel of one link
    #[serde(default = "default_link_buffer_size")]
    pub link_buffer_size: usize,

    /// Capacity of the observer -> manager update channel
    #[serde(default = "default_update_channel_size")]
    pub update_channel_size: usize,

    /// Tear down a registry entry after it had no subscriber for this long.
    /// 0 keeps entries for the lifetime of the process.
    #[serde(default = "default_idle_entry_timeout_ms")]
    pub idle_entry_timeout_ms: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            link_buffer_size: default_link_buffer_size(),
            update_channel_size: default_update_channel_size(),
            idle_entry_timeout_ms: default_idle_entry_timeout_ms(),
        }
    }
}

impl SubscriptionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.link_buffer_size == 0 {
            return Err(config_error("link_buffer_size must be > 0"));
        }
        if self.update_channel_size == 0 {
            return Err(config_error("update_channel_size must be > 0"));
        }
        Ok(())
    }

    pub fn idle_entry_timeout(&self) -> Option<Duration> {
        match self.idle_entry_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

fn default_link_buffer_size() -> usize {
    16
}
fn default_update_channel_size() -> usize {
    64
}
fn default_idle_entry_timeout_ms() -> u64 {
    0
}
