use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::Result;

/// HTTP/2 transport parameters for subscriber connections
///
/// Links are long lived server streams, so keepalive matters more than request
/// timeouts here: a dead peer is only noticed through HTTP/2 pings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Max concurrent streams (links) per connection
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit_per_connection: usize,

    /// HTTP2 SETTINGS_MAX_CONCURRENT_STREAMS
    #[serde(default = "default_max_streams")]
    pub max_concurrent_streams: u32,

    /// TCP keepalive in seconds applied to accepted sockets, 0 disables it
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// HTTP2 keepalive ping interval in seconds
    #[serde(default = "default_h2_keepalive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// HTTP2 keepalive timeout in seconds
    #[serde(default = "default_h2_keepalive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    /// Initial connection-level flow control window in bytes
    #[serde(default = "default_conn_window_size")]
    pub connection_window_size: u32,

    /// Initial stream-level flow control window in bytes
    #[serde(default = "default_stream_window_size")]
    pub stream_window_size: u32,

    /// Enable HTTP2 adaptive window sizing
    #[serde(default = "default_adaptive_window")]
    pub adaptive_window: bool,

    /// Common TCP setting for all connections
    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,

    /// Upper bound for a single encoded snapshot message
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            concurrency_limit_per_connection: default_concurrency_limit(),
            max_concurrent_streams: default_max_streams(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_h2_keepalive_interval(),
            http2_keep_alive_timeout_in_secs: default_h2_keepalive_timeout(),
            connection_window_size: default_conn_window_size(),
            stream_window_size: default_stream_window_size(),
            adaptive_window: default_adaptive_window(),
            tcp_nodelay: default_tcp_nodelay(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl NetworkConfig {
    pub fn tcp_keepalive(&self) -> Option<Duration> {
        match self.tcp_keepalive_in_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit_per_connection == 0 {
            return Err(config_error("concurrency_limit_per_connection must be > 0"));
        }

        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(config_error(format!(
                "keepalive timeout {}s must be < interval {}s",
                self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            )));
        }

        if !self.adaptive_window {
            const MIN_WINDOW: u32 = 65535; // HTTP2 spec minimum
            if self.stream_window_size < MIN_WINDOW {
                return Err(config_error(format!(
                    "stream window size {} below minimum {}",
                    self.stream_window_size, MIN_WINDOW
                )));
            }

            if self.connection_window_size < self.stream_window_size {
                return Err(config_error(format!(
                    "connection window {} smaller than stream window {}",
                    self.connection_window_size, self.stream_window_size
                )));
            }
        }

        if self.max_message_size < 1024 {
            return Err(config_error(format!(
                "max_message_size {} too small, minimum 1024 bytes",
                self.max_message_size
            )));
        }

        Ok(())
    }
}

fn default_concurrency_limit() -> usize {
    1024
}
fn default_max_streams() -> u32 {
    500
}
fn default_tcp_keepalive() -> u64 {
    300
}
fn default_h2_keepalive_interval() -> u64 {
    30
}
fn default_h2_keepalive_timeout() -> u64 {
    10
}
fn default_conn_window_size() -> u32 {
    6_291_456 // 6MB
}
fn default_stream_window_size() -> u32 {
    1_048_576 // 1MB
}
fn default_adaptive_window() -> bool {
    false
}
fn default_tcp_nodelay() -> bool {
    true
}
fn default_max_message_size() -> usize {
    16 * 1024 * 1024
}
