use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TlsConfig {
    /// Enables TLS encryption for subscriber connections
    /// Default: false (disabled)
    #[serde(default = "default_enable_tls")]
    pub enable_tls: bool,

    /// Automatically generates self-signed certificates on startup
    /// Default: false (requires pre-configured certificates)
    #[serde(default = "default_generate_self_signed")]
    pub generate_self_signed_certificates: bool,

    /// Server certificate chain path in PEM format
    /// Default: "./certs/server.pem"
    #[serde(default = "default_server_cert_path")]
    pub server_certificate_path: String,

    /// Server private key path in PEM format
    /// Default: "./certs/server.key"
    #[serde(default = "default_server_key_path")]
    pub server_private_key_path: String,

    /// Client CA certificate path for mTLS authentication
    /// Default: "/etc/ssl/certs/ca.pem"
    #[serde(default = "default_client_ca_path")]
    pub client_certificate_authority_root_path: String,

    /// Enables mutual TLS (mTLS) for bidirectional authentication
    /// Default: false (server-side TLS only)
    #[serde(default = "default_enable_mtls")]
    pub enable_mtls: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enable_tls: default_enable_tls(),
            generate_self_signed_certificates: default_generate_self_signed(),
            server_certificate_path: default_server_cert_path(),
            server_private_key_path: default_server_key_path(),
            client_certificate_authority_root_path: default_client_ca_path(),
            enable_mtls: default_enable_mtls(),
        }
    }
}

impl TlsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enable_mtls && !self.enable_tls {
            return Err(config_error("mTLS requires enable_tls to be true"));
        }

        if !self.enable_tls {
            return Ok(());
        }

        if self.server_certificate_path.is_empty() || self.server_private_key_path.is_empty() {
            return Err(config_error(
                "server_certificate_path and server_private_key_path are required when TLS is enabled",
            ));
        }

        // Generated material is written to the configured paths at startup.
        if !self.generate_self_signed_certificates {
            validate_readable(&self.server_certificate_path, "server certificate")?;
            validate_readable(&self.server_private_key_path, "server private key")?;
        }

        if self.enable_mtls {
            validate_readable(
                &self.client_certificate_authority_root_path,
                "client CA certificate",
            )?;
        }

        Ok(())
    }
}

fn validate_readable(
    path: &str,
    name: &str,
) -> Result<()> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(config_error(format!("{} file {} does not exist", name, path.display())));
    }
    fs::File::open(path).map_err(|e| {
        config_error(format!("{} file {} is unreadable: {}", name, path.display(), e))
    })?;
    Ok(())
}

fn default_enable_tls() -> bool {
    false
}
fn default_generate_self_signed() -> bool {
    false
}
fn default_server_cert_path() -> String {
    "./certs/server.pem".into()
}
fn default_server_key_path() -> String {
    "./certs/server.key".into()
}
fn default_client_ca_path() -> String {
    "/etc/ssl/certs/ca.pem".into()
}
fn default_enable_mtls() -> bool {
    false
}
