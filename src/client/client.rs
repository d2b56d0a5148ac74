use nanoid::nanoid;
use tonic::codec::CompressionEncoding;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::Streaming;
use tracing::debug;

use super::ClientConfig;
use crate::network::filter_to_struct;
use crate::proto::subscription_service_client::SubscriptionServiceClient;
use crate::proto::Snapshot;
use crate::proto::SubscribeRequest;
use crate::subscription::SubscriptionKey;
use crate::NetworkError;
use crate::Result;

/// Opens links on a subscription server.
///
/// Cloning shares the underlying HTTP/2 connection; each
/// [`subscribe`](Self::subscribe) opens one more link on it.
#[derive(Clone, Debug)]
pub struct SubscriptionClient {
    inner: SubscriptionServiceClient<Channel>,
}

impl SubscriptionClient {
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        Self::connect_with_config(endpoint, ClientConfig::default()).await
    }

    pub async fn connect_with_config(
        endpoint: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| NetworkError::InvalidURI(format!("{endpoint}: {e}")))?
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(Some(config.tcp_keepalive))
            .http2_keep_alive_interval(config.http2_keepalive_interval)
            .keep_alive_timeout(config.http2_keepalive_timeout)
            .keep_alive_while_idle(true)
            .connect()
            .await?;
        debug!(%endpoint, "connected to subscription server");

        let mut inner = SubscriptionServiceClient::new(channel);
        if config.enable_compression {
            inner = inner
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        Ok(Self { inner })
    }

    /// Opens a link on `address` filtered by `key`.
    ///
    /// Fails with the server status (e.g. `NOT_FOUND` for an unknown
    /// address) before any snapshot is streamed.
    pub async fn subscribe(
        &mut self,
        address: &str,
        key: &SubscriptionKey,
    ) -> Result<Streaming<Snapshot>> {
        let request = SubscribeRequest {
            address: address.to_string(),
            filter: Some(filter_to_struct(key)),
            link_name: nanoid!(),
        };
        let response = self.inner.subscribe(request).await?;
        Ok(response.into_inner())
    }
}
