//! Configuration types for apimocker.

mod listen;
mod scripting;

use crate::mock::{Mock, MockSpec};
use crate::scripting::RhaiEngine;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use listen::{AdminConfig, HostsConfig};
pub use scripting::ScriptingConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub hosts: HostsConfig,
    #[serde(default)]
    pub scripting: ScriptingConfig,
    /// Default log level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Mocks registered at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mocks: Vec<PreloadedMock>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin: AdminConfig::default(),
            hosts: HostsConfig::default(),
            scripting: ScriptingConfig::default(),
            log_level: default_log_level(),
            mocks: Vec::new(),
        }
    }
}

/// A mock registered on `port` when the server starts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreloadedMock {
    pub port: u16,
    pub mock: MockSpec,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for (field, address) in [
            ("admin.host", &self.admin.host),
            ("hosts.bind_address", &self.hosts.bind_address),
        ] {
            if address.parse::<IpAddr>().is_err() {
                anyhow::bail!("'{field}' must be an IP address, got '{address}'");
            }
        }

        if self.hosts.shutdown_timeout_ms == 0 {
            anyhow::bail!("'hosts.shutdown_timeout_ms' must be greater than zero");
        }

        if self.scripting.max_operations == 0 {
            anyhow::bail!("'scripting.max_operations' must be greater than zero");
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Unknown log level '{}'. Expected one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            );
        }

        self.validate_mocks()
    }

    fn validate_mocks(&self) -> Result<(), anyhow::Error> {
        if self.mocks.is_empty() {
            return Ok(());
        }

        let engine = RhaiEngine::with_max_operations(self.scripting.max_operations);
        for (i, preloaded) in self.mocks.iter().enumerate() {
            if preloaded.port == 0 {
                anyhow::bail!("Preloaded mock #{i} needs a non-zero port");
            }
            if preloaded.port == self.admin.port {
                anyhow::bail!(
                    "Preloaded mock #{i} uses port {}, which is the admin API port",
                    preloaded.port
                );
            }
            Mock::from_spec(&preloaded.mock, &engine).map_err(|e| {
                anyhow::anyhow!(
                    "Invalid preloaded mock #{i} ('{}'): {}",
                    preloaded.mock.name,
                    e
                )
            })?;
        }

        Ok(())
    }
}
