//! Prometheus collectors and the `/metrics` exporter.
//!
//! Collectors are labelled by resource domain. They are created unregistered
//! and added to a registry by [`register_custom_metrics`], so tests can gather
//! them from a private registry.

use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref ACTIVE_SUBSCRIBERS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("active_subscribers", "Subscribers currently registered with a manager"),
        &["domain"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY_ENTRIES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("registry_entries", "Live observer/manager pairs"),
        &["domain"]
    )
    .expect("metric can not be created");

    pub static ref SNAPSHOTS_BROADCAST: IntCounterVec = IntCounterVec::new(
        Opts::new("snapshots_broadcast", "Distinct snapshots fanned out by managers"),
        &["domain"]
    )
    .expect("metric can not be created");

    pub static ref OBSERVER_RELISTS: IntCounterVec = IntCounterVec::new(
        Opts::new("observer_relists", "Relists after a failed list or a broken watch"),
        &["domain"]
    )
    .expect("metric can not be created");

    pub static ref DECODE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("decode_failures", "Store items dropped because the plugin could not decode them"),
        &["domain"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(ACTIVE_SUBSCRIBERS.clone()))?;
    registry.register(Box::new(REGISTRY_ENTRIES.clone()))?;
    registry.register(Box::new(SNAPSHOTS_BROADCAST.clone()))?;
    registry.register(Box::new(OBSERVER_RELISTS.clone()))?;
    registry.register(Box::new(DECODE_FAILURES.clone()))?;
    Ok(())
}

/// Serves `/metrics` on `port` until the shutdown signal fires.
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    if let Err(e) = register_custom_metrics(&REGISTRY) {
        error!("could not register custom metrics: {}", e);
    }
    if let Err(e) = prometheus_exporter::try_init() {
        error!("could not initialize autometrics exporter: {}", e);
    }

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (addr, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    info!(%addr, "metrics server listening");
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(render_metrics(&REGISTRY))
}

/// Custom collectors, default registry collectors, then autometrics output.
pub fn render_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut res = String::new();
    for families in [registry.gather(), prometheus::gather()] {
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buffer) {
            error!("could not encode metrics: {}", e);
            continue;
        }
        match String::from_utf8(buffer) {
            Ok(text) => res.push_str(&text),
            Err(e) => error!("metrics could not be from_utf8'd: {}", e),
        }
    }

    res.push_str(&get_metrics_body());
    res
}

/// Export autometrics metrics for Prometheus to scrape
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
