use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use super::validate_directory;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the subscription front end listens on
    #[serde(default = "default_listen_addr")]
    pub listen_address: SocketAddr,

    /// Directory for the rolling log file of the binary
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Optional JSON file used to seed the in-memory resource store
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_addr(),
            log_dir: default_log_dir(),
            seed_path: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.port() == 0 {
            return Err(config_error("listen_address must specify a non-zero port"));
        }

        validate_directory(&self.log_dir, "log_dir")?;

        if let Some(seed) = &self.seed_path {
            if seed.as_os_str().is_empty() {
                return Err(config_error("seed_path cannot be empty when set"));
            }
        }

        Ok(())
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5672))
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/configserv/logs")
}
