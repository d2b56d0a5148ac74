use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::plugin::ADDRESS_CONFIG_PLUGIN;
use crate::plugin::POD_TOPOLOGY_PLUGIN;
use crate::Result;

/// Binds a subscribable resource domain to a plugin type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DomainBinding {
    /// Name subscribers put in the link address, e.g. "v1/addresses"
    pub name: String,
    /// Plugin type name, e.g. "address-config"
    pub plugin: String,
}

impl DomainBinding {
    pub fn new(
        name: impl Into<String>,
        plugin: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            plugin: plugin.into(),
        }
    }
}

pub(super) fn default_domain_bindings() -> Vec<DomainBinding> {
    vec![
        DomainBinding::new("v1/addresses", ADDRESS_CONFIG_PLUGIN),
        DomainBinding::new("podsense", POD_TOPOLOGY_PLUGIN),
    ]
}

pub(super) fn validate_domain_bindings(bindings: &[DomainBinding]) -> Result<()> {
    if bindings.is_empty() {
        return Err(config_error("at least one resource domain must be bound"));
    }

    let mut names = HashSet::new();
    for binding in bindings {
        if binding.name.trim().is_empty() {
            return Err(config_error("domain name cannot be empty"));
        }
        if !names.insert(binding.name.as_str()) {
            return Err(config_error(format!("Duplicate domain {} in bindings", binding.name)));
        }
        if binding.plugin != ADDRESS_CONFIG_PLUGIN && binding.plugin != POD_TOPOLOGY_PLUGIN {
            return Err(config_error(format!(
                "domain {} is bound to unknown plugin type {}",
                binding.name, binding.plugin
            )));
        }
    }
    Ok(())
}
