use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::AddressConfigPlugin;
use super::PodTopologyPlugin;
use super::ResourcePlugin;
use super::ADDRESS_CONFIG_PLUGIN;
use super::POD_TOPOLOGY_PLUGIN;
use crate::subscription::DomainPlugin;
use crate::DomainBinding;
use crate::PluginError;
use crate::Result;

/// Start-up mapping from resource domain name to plugin instance
#[derive(Clone, Default)]
pub struct PluginRegistry {
    domains: HashMap<String, Arc<dyn DomainPlugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut map = f.debug_map();
        for name in self.domain_names() {
            if let Some(plugin) = self.domains.get(name) {
                map.entry(&name, &plugin.type_name());
            }
        }
        map.finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves every binding to one of the built-in plugin types.
    pub fn from_bindings(bindings: &[DomainBinding]) -> Result<Self> {
        let mut registry = Self::new();
        for binding in bindings {
            let plugin = builtin_plugin(&binding.plugin)?;
            debug!(domain = %binding.name, plugin = %binding.plugin, "domain bound");
            registry.domains.insert(binding.name.clone(), plugin);
        }
        Ok(registry)
    }

    /// Binds `domain` to `plugin`, replacing any previous binding.
    pub fn with_domain<P: ResourcePlugin>(
        mut self,
        domain: impl Into<String>,
        plugin: P,
    ) -> Self {
        self.domains.insert(domain.into(), Arc::new(plugin));
        self
    }

    pub fn get(
        &self,
        domain: &str,
    ) -> Option<Arc<dyn DomainPlugin>> {
        self.domains.get(domain).cloned()
    }

    /// Bound domain names in lexical order
    pub fn domain_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.domains.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn builtin_plugin(type_name: &str) -> Result<Arc<dyn DomainPlugin>> {
    match type_name {
        ADDRESS_CONFIG_PLUGIN => Ok(Arc::new(AddressConfigPlugin)),
        POD_TOPOLOGY_PLUGIN => Ok(Arc::new(PodTopologyPlugin)),
        other => Err(PluginError::UnknownPlugin(other.to_string()).into()),
    }
}
