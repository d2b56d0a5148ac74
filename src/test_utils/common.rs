use serde_json::json;

use crate::plugin::PodInfo;
use crate::plugin::PodTopologyPlugin;
use crate::plugin::ResourcePlugin;
use crate::store::ResourceItem;
use crate::Settings;

lazy_static::lazy_static! {
    static ref LOGGER_INIT: () = {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    };
}

pub fn enable_logger() {
    lazy_static::initialize(&LOGGER_INIT);
}

/// Pod labelled `app=x` exposing `amqp:5672` from one container
pub(crate) fn pod_item(
    name: &str,
    host: &str,
    phase: &str,
) -> ResourceItem {
    ResourceItem::new("Pod", name).with_label("app", "x").with_object(json!({
        "spec": {
            "containers": [
                {"name": "broker", "ports": [{"name": "amqp", "containerPort": 5672}]}
            ]
        },
        "status": {"hostIP": host, "phase": phase}
    }))
}

pub(crate) fn pod_value(
    name: &str,
    host: &str,
    phase: &str,
) -> PodInfo {
    PodTopologyPlugin
        .decode(&pod_item(name, host, phase))
        .expect("fixture pod decodes")
}

/// Defaults with a fast, jitter-free relist backoff
pub(crate) fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.retry.relist.base_delay_ms = 10;
    settings.retry.relist.max_delay_ms = 100;
    settings.retry.relist.jitter_percent = 0;
    settings
}

/// Polls `condition` until it holds, panicking after five seconds.
pub(crate) async fn wait_for(
    what: &str,
    condition: impl Fn() -> bool,
) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}
