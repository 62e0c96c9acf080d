//! Fleet configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a valid
//! configuration for a host on a network with sensors in factory settings.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use lidarctl_core::constants::{
    DEFAULT_COMMAND_PORT, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_DETECTION_PORT,
    DEFAULT_DISCOVERY_INTERVAL_MS, DEFAULT_DISCOVERY_WINDOW_MS,
};
use lidarctl_transport::{SimulatedDevice, UdpConfig};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Fleet controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    /// Local address to bind (default: 0.0.0.0)
    #[serde(default = "default_host_ip")]
    pub host_ip: Ipv4Addr,

    /// Local port to bind (0 = ephemeral)
    #[serde(default)]
    pub host_port: u16,

    /// Destination of discovery broadcasts
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: Ipv4Addr,

    /// Sensor discovery port
    #[serde(default = "default_detection_port")]
    pub detection_port: u16,

    /// Sensor command port
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Time between discovery broadcasts (ms)
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_ms: u64,

    /// How long discovery runs before targets are selected (ms)
    #[serde(default = "default_discovery_window")]
    pub discovery_window_ms: u64,

    /// How long a fleet operation may take (ms)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Simulated fleet used with `--simulate`
    #[serde(default)]
    pub simulation: Option<SimulationConfig>,
}

/// Simulated fleet
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default)]
    pub devices: Vec<SimulatedDevice>,
}

fn default_host_ip() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_broadcast_address() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_detection_port() -> u16 {
    DEFAULT_DETECTION_PORT
}

fn default_command_port() -> u16 {
    DEFAULT_COMMAND_PORT
}

fn default_discovery_interval() -> u64 {
    DEFAULT_DISCOVERY_INTERVAL_MS
}

fn default_discovery_window() -> u64 {
    DEFAULT_DISCOVERY_WINDOW_MS
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            host_ip: default_host_ip(),
            host_port: 0,
            broadcast_address: default_broadcast_address(),
            detection_port: default_detection_port(),
            command_port: default_command_port(),
            discovery_interval_ms: default_discovery_interval(),
            discovery_window_ms: default_discovery_window(),
            command_timeout_ms: default_command_timeout(),
            simulation: None,
        }
    }
}

impl FleetConfig {
    /// Load configuration from a JSON file
    ///
    /// Values are not checked here; call [`validate`](Self::validate) once
    /// command-line overrides have been applied.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection_port == 0 {
            return Err(ConfigError::InvalidValue("detection_port cannot be 0".into()));
        }
        if self.command_port == 0 {
            return Err(ConfigError::InvalidValue("command_port cannot be 0".into()));
        }
        if self.discovery_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "discovery_interval_ms cannot be 0".into(),
            ));
        }
        if self.discovery_window_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "discovery_window_ms cannot be 0".into(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "command_timeout_ms cannot be 0".into(),
            ));
        }
        Ok(())
    }

    /// Get discovery window as Duration
    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    /// Get command timeout as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Settings for the UDP transport
    pub fn udp(&self) -> UdpConfig {
        UdpConfig {
            host_ip: self.host_ip,
            host_port: self.host_port,
            broadcast_address: self.broadcast_address,
            detection_port: self.detection_port,
            command_port: self.command_port,
            discovery_interval: Duration::from_millis(self.discovery_interval_ms),
        }
    }

    /// Simulated devices, if the file has a simulation section
    pub fn simulated_devices(&self) -> Result<Vec<SimulatedDevice>, ConfigError> {
        self.simulation
            .as_ref()
            .map(|sim| sim.devices.clone())
            .ok_or_else(|| ConfigError::InvalidValue("--simulate needs a simulation section".into()))
    }
}
