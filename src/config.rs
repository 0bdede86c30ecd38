//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. One configuration file describes all
//! charger instances; each instance gets its own driver and D-Bus service.

use crate::error::{HeliosError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Minimum supported charger hardware version (API v2 firmware)
pub const MIN_HARDWARE_VERSION: u32 = 3;

/// Poll intervals at or below this many milliseconds refuse to start
pub const MIN_POLL_INTERVAL_MS: u64 = 20;

fn default_access_type() -> String {
    "OnPremise".to_string()
}

fn default_sign_of_life() -> u32 {
    5
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Minutes between "sign of life" diagnostic log lines
    #[serde(default = "default_sign_of_life")]
    pub sign_of_life_interval_min: u32,

    /// Charger instances to drive (each gets its own D-Bus service)
    pub chargers: Vec<ChargerConfig>,
}

/// Per-charger connection and identity parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerConfig {
    /// Hostname or IP address of the charger's HTTP API
    pub host: String,

    /// Device instance for D-Bus service naming
    pub device_instance: u32,

    /// Charger hardware version; must meet [`MIN_HARDWARE_VERSION`]
    pub hardware_version: u32,

    /// GX position index (0 = AC output, 1 = AC input)
    pub position: u8,

    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Access type label shown in the /Mgmt/Connection string
    #[serde(default = "default_access_type")]
    pub access_type: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (or directory for the rotating appender)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/var/log/helios/helios.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.50".to_string(),
            device_instance: 0,
            hardware_version: MIN_HARDWARE_VERSION,
            position: 0,
            poll_interval_ms: 2000,
            access_type: default_access_type(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            sign_of_life_interval_min: default_sign_of_life(),
            chargers: vec![ChargerConfig::default()],
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "helios_config.yaml",
            "/data/helios_config.yaml",
            "/etc/helios/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration. Failures here are fatal: an instance
    /// with an invalid poll interval or unsupported hardware refuses to
    /// start rather than hammering the device.
    pub fn validate(&self) -> Result<()> {
        if self.sign_of_life_interval_min == 0 {
            return Err(HeliosError::validation(
                "sign_of_life_interval_min",
                "sign of life interval must be at least one minute",
            ));
        }

        if self.chargers.is_empty() {
            return Err(HeliosError::validation(
                "chargers",
                "at least one charger must be configured",
            ));
        }

        let mut seen = HashSet::new();
        for charger in &self.chargers {
            charger.validate()?;
            if !seen.insert(charger.device_instance) {
                return Err(HeliosError::validation(
                    "chargers.device_instance",
                    "device instances must be unique",
                ));
            }
        }

        Ok(())
    }
}

impl ChargerConfig {
    /// Validate a single charger entry
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(HeliosError::validation("host", "host cannot be empty"));
        }

        if self.poll_interval_ms <= MIN_POLL_INTERVAL_MS {
            return Err(HeliosError::validation(
                "poll_interval_ms",
                "poll interval must be greater than 20 ms",
            ));
        }

        if self.hardware_version < MIN_HARDWARE_VERSION {
            return Err(HeliosError::validation(
                "hardware_version",
                "minimum hardware version required is 3",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chargers.len(), 1);
        assert_eq!(config.chargers[0].poll_interval_ms, 2000);
        assert_eq!(config.sign_of_life_interval_min, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        // Empty host
        config.chargers[0].host = String::new();
        assert!(config.validate().is_err());

        // Poll interval at the boundary is rejected
        config = Config::default();
        config.chargers[0].poll_interval_ms = MIN_POLL_INTERVAL_MS;
        assert!(config.validate().is_err());
        config.chargers[0].poll_interval_ms = MIN_POLL_INTERVAL_MS + 1;
        assert!(config.validate().is_ok());

        // Hardware version floor
        config = Config::default();
        config.chargers[0].hardware_version = 2;
        assert!(config.validate().is_err());

        // Duplicate device instances
        config = Config::default();
        config.chargers.push(config.chargers[0].clone());
        assert!(config.validate().is_err());

        // A zero sign-of-life interval would make the diagnostic timer fire
        // continuously; reject it up front
        config = Config::default();
        config.sign_of_life_interval_min = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            config.chargers[0].host,
            deserialized.chargers[0].host
        );
        assert_eq!(config.logging.level, deserialized.logging.level);
    }
}
