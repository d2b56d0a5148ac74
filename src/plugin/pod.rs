use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::decode_error;
use super::Payload;
use super::ResourcePlugin;
use super::ResourceSet;
use crate::store::ResourceItem;
use crate::PluginError;

pub const POD_TOPOLOGY_PLUGIN: &str = "pod-topology";

/// Phases after which a pod never serves again
const TERMINAL_PHASES: [&str; 2] = ["Succeeded", "Failed"];

/// Container name -> port name -> port number
pub type ContainerPorts = BTreeMap<String, BTreeMap<String, u16>>;

/// Placement and reachability of one pod
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PodInfo {
    pub name: String,
    pub host: String,
    pub phase: String,
    pub ready: bool,
    pub ports: ContainerPorts,
}

/// Pod topology: where each pod runs and which named ports it exposes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PodTopologyPlugin;

impl PodTopologyPlugin {
    fn ready(status: Option<&Value>) -> bool {
        status
            .and_then(|s| s.get("conditions"))
            .and_then(Value::as_array)
            .map(|conditions| {
                conditions.iter().any(|c| {
                    c.get("type").and_then(Value::as_str) == Some("Ready")
                        && c.get("status").and_then(Value::as_str) == Some("True")
                })
            })
            .unwrap_or(false)
    }

    fn ports(item: &ResourceItem) -> Result<ContainerPorts, PluginError> {
        let mut result = ContainerPorts::new();
        let containers = item
            .object
            .get("spec")
            .and_then(|s| s.get("containers"))
            .and_then(Value::as_array);

        for container in containers.into_iter().flatten() {
            let Some(container_name) = container.get("name").and_then(Value::as_str) else {
                return Err(decode_error(item, "container without a name"));
            };

            let mut named = BTreeMap::new();
            for port in container.get("ports").and_then(Value::as_array).into_iter().flatten() {
                // Unnamed ports cannot be addressed by subscribers.
                let Some(port_name) = port.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let number = port
                    .get("containerPort")
                    .and_then(Value::as_u64)
                    .and_then(|n| u16::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        decode_error(item, format!("invalid containerPort for port {port_name}"))
                    })?;
                named.insert(port_name.to_string(), number);
            }

            if !named.is_empty() {
                result.insert(container_name.to_string(), named);
            }
        }
        Ok(result)
    }
}

impl ResourcePlugin for PodTopologyPlugin {
    type Value = PodInfo;

    const TYPE_NAME: &'static str = POD_TOPOLOGY_PLUGIN;

    fn kinds(&self) -> &'static [&'static str] {
        &["Pod"]
    }

    fn decode(
        &self,
        item: &ResourceItem,
    ) -> Result<PodInfo, PluginError> {
        let status = item.object.get("status");
        let text = |field: &str| {
            status
                .and_then(|s| s.get(field))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(PodInfo {
            name: item.name.clone(),
            host: text("hostIP"),
            phase: text("phase"),
            ready: Self::ready(status),
            ports: Self::ports(item)?,
        })
    }

    fn filter(
        &self,
        value: &PodInfo,
    ) -> bool {
        !value.host.is_empty() && !TERMINAL_PHASES.contains(&value.phase.as_str())
    }

    fn encode(
        &self,
        values: &ResourceSet<PodInfo>,
    ) -> Result<Payload, PluginError> {
        let records: Vec<&PodInfo> = values.iter().collect();
        Ok(Payload::json(serde_json::to_vec(&records)?))
    }
}
