//! Node configuration
//!
//! One TOML file, typed at load time:
//!
//! ```toml
//! gateway_id = "gw-1"
//! log_level = "info"
//!
//! [cache]
//! lock_wait_timeout = "30s"
//!
//! [coordinator]
//! net_id = "000013"
//! preferred_gateway_receive_interval = "200ms"
//!
//! [packet_forwarder]
//! command = "/opt/lora/station"
//! args = ["--home", "/opt/lora"]
//! restart_delay = "5s"
//!
//! [[devices]]
//! dev_eui = "0004A30B001C0530"
//! join_eui = "70B3D57ED0000001"
//! app_key = "00112233445566778899AABBCCDDEEFF"
//! class = "C"
//! ```
//!
//! CLI flags override the file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lib_coordinator::{CoordinatorConfig, DeviceRecord};
use lib_storage::CacheConfig;
use lib_types::{DevEui, GatewayId};
use serde::{Deserialize, Serialize};

/// Command line arguments structure
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: PathBuf,
    pub gateway_id: Option<String>,
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Level used until the configuration file has been read
    pub fn startup_log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

/// Packet-forwarder process to keep alive next to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketForwarderConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Delay before restarting an exited forwarder
    #[serde(with = "humantime_serde", default = "default_restart_delay")]
    pub restart_delay: Duration,
    /// Restart the forwarder when it exits
    #[serde(default = "default_restart")]
    pub restart: bool,
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_restart() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Gateway this process serves; used when a replayed line names none
    #[serde(default = "default_gateway_id")]
    pub gateway_id: GatewayId,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub packet_forwarder: Option<PacketForwarderConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
}

fn default_gateway_id() -> GatewayId {
    GatewayId::from("gateway-0")
}

const DEFAULT_LOG_LEVEL: &str = "info";

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            gateway_id: default_gateway_id(),
            log_level: default_log_level(),
            cache: CacheConfig::default(),
            coordinator: CoordinatorConfig::default(),
            packet_forwarder: None,
            devices: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Apply CLI argument overrides
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(gateway_id) = &args.gateway_id {
            self.gateway_id = GatewayId::from(gateway_id.as_str());
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
    }

    /// Check the parts serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway_id.as_str().trim().is_empty() {
            return Err(ConfigError::EmptyGatewayId);
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            device.validate().map_err(|reason| ConfigError::InvalidDevice {
                dev_eui: device.dev_eui,
                reason,
            })?;
            if !seen.insert(device.dev_eui) {
                return Err(ConfigError::InvalidDevice {
                    dev_eui: device.dev_eui,
                    reason: "listed more than once".to_string(),
                });
            }
        }

        if let Some(forwarder) = &self.packet_forwarder {
            if forwarder.command.trim().is_empty() {
                return Err(ConfigError::InvalidPacketForwarder("command is empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Configuration loading error
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid device {dev_eui}: {reason}")]
    InvalidDevice { dev_eui: DevEui, reason: String },

    #[error("Invalid packet forwarder configuration: {0}")]
    InvalidPacketForwarder(String),

    #[error("Gateway id must not be empty")]
    EmptyGatewayId,
}

/// Parse a configuration file without CLI overrides
pub async fn read_config_file(path: &Path) -> Result<NodeConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }

    let content = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate complete node configuration
pub async fn load_configuration(args: &CliArgs) -> Result<NodeConfig, ConfigError> {
    tracing::info!("Loading configuration from {}", args.config.display());

    let mut config = read_config_file(&args.config).await?;
    config.apply_cli_overrides(args);
    config.validate()?;

    let preferred = config
        .devices
        .iter()
        .filter(|device| device.uses_preferred_gateway())
        .count();
    tracing::info!(
        gateway_id = %config.gateway_id,
        devices = config.devices.len(),
        preferred_gateway_devices = preferred,
        "Configuration validated"
    );
    Ok(config)
}
