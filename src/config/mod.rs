//! Configuration management for the subscription service.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - An optional `config/configserv.toml` next to the working directory
//! - A configuration file named by `CONFIG_PATH`
//! - Runtime override files
//! - Environment variable overrides (`CONFIGSERV__SECTION__KEY`)
//! - Component-wise validation

mod domains;
mod monitoring;
mod network;
mod retry;
mod server;
mod subscription;
mod tls;
pub use domains::*;
pub use monitoring::*;
pub use network::*;
pub use retry::*;
pub use server::*;
pub use subscription::*;
pub use tls::*;

use domains::default_domain_bindings;
use domains::validate_domain_bindings;

#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;
use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

pub(crate) const ENV_PREFIX: &str = "CONFIGSERV";
pub(crate) const DEFAULT_CONFIG_FILE: &str = "config/configserv";

/// Main configuration container for the subscription service
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. `config/configserv.toml` when present
/// 3. Configuration file specified by `CONFIG_PATH`
/// 4. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Listen address and process level paths
    #[serde(default)]
    pub server: ServerConfig,
    /// HTTP/2 transport tuning for subscriber connections
    #[serde(default)]
    pub network: NetworkConfig,
    /// TLS/SSL security configuration
    #[serde(default)]
    pub tls: TlsConfig,
    /// Backoff applied when an observer relists after a watch failure
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Per-link buffering and registry entry lifecycle
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    /// Metrics exporter settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Resource domain to plugin bindings
    #[serde(default = "default_domain_bindings")]
    pub domains: Vec<DomainBinding>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            network: NetworkConfig::default(),
            tls: TlsConfig::default(),
            retry: RetryPolicies::default(),
            subscription: SubscriptionConfig::default(),
            monitoring: MonitoringConfig::default(),
            domains: default_domain_bindings(),
        }
    }
}

impl Debug for Settings {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("server", &self.server)
            .field("domains", &self.domains)
            .finish()
    }
}

impl Settings {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so that callers can apply further overrides via
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIGSERV__SERVER__LISTEN_ADDRESS", "0.0.0.0:5671");
    /// let settings = Settings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.server.validate()?;
        self.network.validate()?;
        self.tls.validate()?;
        self.retry.validate()?;
        self.subscription.validate()?;
        self.monitoring.validate()?;
        validate_domain_bindings(&self.domains)?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

pub(crate) fn config_error(message: impl Into<String>) -> Error {
    Error::Config(ConfigError::Message(message.into()))
}

/// Ensures directory path is valid and writable
pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(config_error(format!("{name} path cannot be empty")));
    }

    #[cfg(not(test))]
    {
        use std::fs;
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                config_error(format!(
                    "Failed to create {} directory at {}: {}",
                    name,
                    path.display(),
                    e
                ))
            })?;
        }

        let test_file = path.join(".permission_test");
        fs::write(&test_file, b"test").map_err(|e| {
            config_error(format!(
                "No write permission in {} directory {}: {}",
                name,
                path.display(),
                e
            ))
        })?;
        fs::remove_file(&test_file).ok();
    }

    Ok(())
}
