//! Configuration module for the virtual interface manager
//!
//! This module provides TOML-based configuration parsing and validation.

use crate::error::{IfaceError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Device node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path to the TUN/TAP clone device node
    #[serde(default = "default_device_path")]
    pub device_path: String,
    /// Whether the kernel should prepend packet-info framing to each packet
    #[serde(default)]
    pub packet_info: bool,
    /// MTU value used for packet read buffers
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_path: default_device_path(),
            packet_info: false,
            mtu: default_mtu(),
        }
    }
}

/// Lifecycle manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Whether bring-up/bring-down apply the administrative link state
    /// through the system `ip` tool, or only track the transition
    #[serde(default = "default_true")]
    pub apply_link_state: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            apply_link_state: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device node configuration
    #[serde(default)]
    pub device: DeviceConfig,
    /// Lifecycle manager configuration
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| IfaceError::Config(format!("Failed to read config file: {e}")))?;

        <Self as FromStr>::from_str(&contents)
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| IfaceError::Config(format!("Failed to serialize config: {e}")))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.device_path.is_empty() {
            return Err(IfaceError::Config(
                "Device node path cannot be empty".to_string(),
            ));
        }

        if self.device.mtu < 576 || self.device.mtu > 9000 {
            return Err(IfaceError::Config(
                "MTU must be between 576 and 9000".to_string(),
            ));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = IfaceError;

    fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_device_path() -> String {
    "/dev/net/tun".to_string()
}

fn default_mtu() -> u16 {
    1500
}

fn default_log_level() -> String {
    "info".to_string()
}
