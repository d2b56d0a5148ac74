use std::time::Duration;

/// Connection settings of a [`SubscriptionClient`](super::SubscriptionClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum time to wait for establishing a TCP connection
    /// Default: 1 second
    pub connect_timeout: Duration,

    /// TCP keepalive duration for idle connections
    /// Default: 5 minutes (300s)
    pub tcp_keepalive: Duration,

    /// Interval for HTTP/2 keepalive pings. Links are long lived, so this is
    /// what detects a dead server.
    /// Default: 30 seconds
    pub http2_keepalive_interval: Duration,

    /// Timeout for HTTP/2 keepalive pings
    /// Default: 10 seconds
    pub http2_keepalive_timeout: Duration,

    /// Enable Gzip compression for network traffic
    /// Default: true (enabled)
    pub enable_compression: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(1000),
            tcp_keepalive: Duration::from_secs(300),
            http2_keepalive_interval: Duration::from_secs(30),
            http2_keepalive_timeout: Duration::from_secs(10),
            enable_compression: true,
        }
    }
}
