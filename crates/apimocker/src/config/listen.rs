//! Admin listener and host listener configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_host")]
    pub host: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

fn default_admin_host() -> String {
    "0.0.0.0".to_string()
}

fn default_admin_port() -> u16 {
    2525
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: default_admin_host(),
            port: default_admin_port(),
        }
    }
}

/// Settings applied to every host listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostsConfig {
    /// Interface host listeners bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Upper bound on draining connections when a host stops
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

impl HostsConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}
