//! Assembles a runnable subscription [`Service`].
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let service = ServiceBuilder::new(settings, shutdown_rx)
//!     .store(Arc::new(store))      // Optional override
//!     .build()?
//!     .start_metrics_server(shutdown_tx.subscribe());
//! service.run().await?;
//! ```
//!
//! Without an explicit store the service observes a [`MemoryStore`], seeded
//! from `server.seed_path` when one is configured.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::metrics;
use crate::network;
use crate::plugin::PluginRegistry;
use crate::store::MemoryStore;
use crate::store::ResourceStore;
use crate::subscription::ResourceDatabase;
use crate::Result;
use crate::Settings;

pub struct ServiceBuilder {
    settings: Settings,
    store: Option<Arc<dyn ResourceStore>>,
    plugins: Option<PluginRegistry>,
    shutdown_signal: watch::Receiver<()>,
}

impl ServiceBuilder {
    pub fn new(
        settings: Settings,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            settings,
            store: None,
            plugins: None,
            shutdown_signal,
        }
    }

    /// Resource store to observe instead of the built-in memory store
    pub fn store(
        mut self,
        store: Arc<dyn ResourceStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    /// Domain bindings to use instead of the configured ones
    pub fn plugins(
        mut self,
        plugins: PluginRegistry,
    ) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn build(self) -> Result<Service> {
        let store = match self.store {
            Some(store) => store,
            None => default_store(&self.settings)?,
        };
        let database = match self.plugins {
            Some(plugins) => ResourceDatabase::new(plugins, store, &self.settings),
            None => ResourceDatabase::from_settings(&self.settings, store)?,
        };
        info!(domains = ?database.plugins().domain_names(), "resource domains bound");

        Ok(Service {
            settings: self.settings,
            database,
            shutdown_signal: self.shutdown_signal,
        })
    }
}

fn default_store(settings: &Settings) -> Result<Arc<dyn ResourceStore>> {
    let store = match &settings.server.seed_path {
        Some(path) => MemoryStore::from_seed_file(path)?,
        None => MemoryStore::new(),
    };
    Ok(Arc::new(store))
}

/// A built service, ready to serve links
pub struct Service {
    settings: Settings,
    database: ResourceDatabase,
    shutdown_signal: watch::Receiver<()>,
}

impl Service {
    pub fn database(&self) -> &ResourceDatabase {
        &self.database
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Starts the Prometheus endpoint if monitoring is enabled.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if self.settings.monitoring.prometheus_enabled {
            let port = self.settings.monitoring.prometheus_port;
            tokio::spawn(async move {
                metrics::start_server(port, shutdown_signal).await;
            });
        }
        self
    }

    /// Serves on the configured listen address until shutdown.
    pub async fn run(self) -> Result<()> {
        network::start_rpc_server(self.database, &self.settings, self.shutdown_signal).await
    }

    /// Serves on an already bound listener until shutdown.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
    ) -> Result<()> {
        network::serve_rpc(self.database, &self.settings, listener, self.shutdown_signal).await
    }
}
