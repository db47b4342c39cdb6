use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::{
    core::{ConnectionOptions, HealthConfig, NewDevice, RegistryConfig},
    protocol::SerialConfig,
};

/// Connection timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSection {
    /// Wait between reconnect attempts in milliseconds
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// Lifetime of a cached status snapshot in seconds
    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,
}

fn default_reconnect_backoff_ms() -> u64 {
    5000
}

fn default_status_ttl_secs() -> u64 {
    300
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            status_ttl_secs: default_status_ttl_secs(),
        }
    }
}

/// Device record storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// JSON file holding device records. In-memory only when unset.
    pub devices_file: Option<PathBuf>,
}

/// Root configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub serial: SerialConfig,
    pub connection: ConnectionSection,
    pub health: HealthConfig,
    pub store: StoreSection,
    /// Devices registered at startup when their serial port is not known yet
    pub devices: Vec<NewDevice>,
}

impl HubConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Read configuration from a file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {path:?}"))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config {path:?}"))
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            connection: ConnectionOptions {
                serial: self.serial.clone(),
                reconnect_backoff: Duration::from_millis(self.connection.reconnect_backoff_ms),
                status_ttl: Duration::from_secs(self.connection.status_ttl_secs),
            },
            health: self.health.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::runtime::ParityMode;

    #[test]
    fn empty_file_gives_defaults() {
        let config = HubConfig::from_toml("").unwrap();
        assert_eq!(config, HubConfig::default());
        let registry = config.registry_config();
        assert_eq!(registry.connection.serial.baud, 115_200);
        assert_eq!(registry.connection.reconnect_backoff, Duration::from_secs(5));
        assert_eq!(registry.connection.status_ttl, Duration::from_secs(300));
        assert_eq!(registry.health.timeout(), Duration::from_secs(60));
        assert_eq!(registry.health.interval(), Duration::from_secs(10));
    }

    #[test]
    fn sections_and_devices_parse() {
        let config = HubConfig::from_toml(
            r#"
            [serial]
            baud = 9600
            parity = "even"

            [health]
            heartbeat_timeout_secs = 90

            [store]
            devices_file = "/var/lib/smshub/devices.json"

            [[devices]]
            name = "hk-1"
            serialPort = "/dev/ttyUSB0"
            enabled = true
            groupName = "hk"
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.serial.parity, ParityMode::Even);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.health.heartbeat_timeout_secs, 90);
        assert_eq!(config.health.check_interval_secs, 10);
        assert_eq!(
            config.store.devices_file.as_deref(),
            Some(std::path::Path::new("/var/lib/smshub/devices.json"))
        );
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].serial_port, "/dev/ttyUSB0");
        assert!(config.devices[0].enabled);
    }

    #[test]
    fn unknown_parity_is_rejected() {
        assert!(HubConfig::from_toml("[serial]\nparity = \"mark\"").is_err());
    }
}
