//! gRPC transport: the subscription front end and its server bootstrap.

mod filter;
mod link_handler;
mod subscription_service;
pub use filter::*;
pub use link_handler::LinkState;
pub(crate) use link_handler::*;
pub use subscription_service::*;

#[cfg(test)]
mod link_handler_test;

//-------------------------------------------------------------------------------
// Start RPC Server
use std::path::Path;
use std::time::Duration;

use rcgen::generate_simple_self_signed;
use rcgen::CertifiedKey;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tonic::codec::CompressionEncoding;
use tonic::transport::Certificate;
use tonic::transport::Identity;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tonic::transport::ServerTlsConfig;
use tonic_health::server::health_reporter;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::proto::subscription_service_server::SubscriptionServiceServer;
use crate::subscription::ResourceDatabase;
use crate::NetworkConfig;
use crate::NetworkError;
use crate::Result;
use crate::Settings;
use crate::TlsConfig;

/// Binds `settings.server.listen_address` and serves until the shutdown
/// signal fires.
pub async fn start_rpc_server(
    database: ResourceDatabase,
    settings: &Settings,
    shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(settings.server.listen_address).await?;
    serve_rpc(database, settings, listener, shutdown_signal).await
}

/// Serves the subscription and health services on an already bound listener.
pub async fn serve_rpc(
    database: ResourceDatabase,
    settings: &Settings,
    listener: TcpListener,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let listen_address = listener.local_addr()?;

    // Create a HealthReporter to manage the health status
    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<SubscriptionServiceServer<SubscriptionServer>>()
        .await;

    let network = &settings.network;
    let mut server_builder = Server::builder()
        .concurrency_limit_per_connection(network.concurrency_limit_per_connection)
        .max_concurrent_streams(Some(network.max_concurrent_streams))
        .http2_keepalive_interval(Some(Duration::from_secs(
            network.http2_keep_alive_interval_in_secs,
        )))
        .http2_keepalive_timeout(Some(Duration::from_secs(
            network.http2_keep_alive_timeout_in_secs,
        )))
        .initial_stream_window_size(network.stream_window_size)
        .initial_connection_window_size(network.connection_window_size)
        .http2_adaptive_window(Some(network.adaptive_window));

    if settings.tls.enable_tls {
        server_builder = server_builder
            .tls_config(server_tls_config(&settings.tls)?)
            .map_err(|e| NetworkError::TlsSetup(e.to_string()))?;
    }

    let service = SubscriptionServiceServer::new(SubscriptionServer::new(
        database.clone(),
        &settings.subscription,
    ))
    .max_decoding_message_size(network.max_message_size)
    .max_encoding_message_size(network.max_message_size)
    .accept_compressed(CompressionEncoding::Gzip)
    .send_compressed(CompressionEncoding::Gzip);

    let incoming = tcp_incoming(listener, network)?;

    // Links end only once the registry lets go of their subscribers.
    let registry = database.clone();
    let shutdown = async move {
        let _ = shutdown_signal.changed().await;
        warn!("Stopping RPC server. {}", listen_address);
        registry.close();
    };

    info!(%listen_address, "subscription service listening");
    let served = server_builder
        .add_service(health_service)
        .add_service(service)
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await;
    database.close();

    if let Err(e) = served {
        error!("error to start subscription rpc server :{:?}.", e);
        return Err(e.into());
    }
    debug!("rpc service finished!");
    Ok(())
}

/// Accepted sockets carry the configured `TCP_NODELAY` and keepalive.
pub(crate) fn tcp_incoming(
    listener: TcpListener,
    network: &NetworkConfig,
) -> Result<TcpIncoming> {
    TcpIncoming::from_listener(listener, network.tcp_nodelay, network.tcp_keepalive())
        .map_err(|e| NetworkError::ListenerSetup(e.to_string()).into())
}

fn server_tls_config(config: &TlsConfig) -> Result<ServerTlsConfig> {
    if config.generate_self_signed_certificates {
        if Path::new(&config.server_certificate_path).exists() {
            warn!("Server certificate already exists, remove the file if you want to generate new certificates. Skipping self signed certificates generation.");
        } else {
            info!("Generating self signed certificates");
            generate_self_signed_certificates(config)?;
        }
    }

    let read = |path: &str, what: &str| {
        std::fs::read_to_string(path)
            .map_err(|e| NetworkError::TlsSetup(format!("failed to read {what} {path}: {e}")))
    };

    let cert = read(&config.server_certificate_path, "server certificate")?;
    let key = read(&config.server_private_key_path, "server private key")?;
    let tls = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

    if config.enable_mtls {
        let client_ca_cert = read(
            &config.client_certificate_authority_root_path,
            "client certificate authority root",
        )?;
        info!("gRPC mTLS enabled");
        return Ok(tls.client_ca_root(Certificate::from_pem(client_ca_cert)));
    }

    info!("gRPC TLS enabled");
    Ok(tls)
}

fn generate_self_signed_certificates(config: &TlsConfig) -> Result<()> {
    let subject_alt_names = vec!["localhost".to_string()];
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(subject_alt_names)
        .map_err(|e| NetworkError::TlsSetup(format!("certificate generation failed: {e}")))?;

    for path in [&config.server_certificate_path, &config.server_private_key_path] {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&config.server_certificate_path, cert.pem())?;
    std::fs::write(&config.server_private_key_path, key_pair.serialize_pem())?;
    Ok(())
}
