//! blelink CLI configuration management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Built-in defaults
//! - Configuration file (`blelink.toml`, or the path given with `--config`)
//! - Environment variables (`BLELINK_*`, nested keys separated by `__`,
//!   e.g. `BLELINK_LINK__SERVICE_UUID=1234`)
//! - Command line arguments

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use blelink_ble::BleConfig;
use blelink_core::LinkConfig;

/// File read when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "blelink.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "BLELINK_";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the blelink CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target identifiers and driver sizing
    pub link: LinkConfig,

    /// BLE backend settings
    pub ble: BleConfig,

    /// Front-end behavior
    pub cli: CliConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Prompt shown in chat mode
    pub prompt: String,

    /// How long to wait for the link to become ready, in seconds
    pub ready_timeout_secs: u64,

    /// Print received messages as hex instead of text
    pub show_hex: bool,

    /// Delay between a one-shot send and the disconnect, in milliseconds
    pub send_grace_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            prompt: "blelink> ".to_string(),
            ready_timeout_secs: 20,
            show_hex: false,
            send_grace_ms: 500,
        }
    }
}

impl CliConfig {
    /// Ready timeout as a duration
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Send grace period as a duration
    pub fn send_grace(&self) -> Duration {
        Duration::from_millis(self.send_grace_ms)
    }
}

/// Values given on the command line, applied last
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub service_uuid: Option<String>,
    pub characteristic_uuid: Option<String>,
    pub adapter_index: Option<usize>,
    pub scan_timeout_ms: Option<u64>,
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load defaults, file and environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(path, &ConfigOverrides::default())
    }

    /// Load all layers including command line overrides
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Self::figment(path)?;

        if let Some(service) = &overrides.service_uuid {
            figment = figment.merge(("link.service_uuid", service));
        }
        if let Some(characteristic) = &overrides.characteristic_uuid {
            figment = figment.merge(("link.characteristic_uuid", characteristic));
        }
        if let Some(index) = overrides.adapter_index {
            figment = figment.merge(("ble.adapter_index", index));
        }
        if let Some(timeout) = overrides.scan_timeout_ms {
            figment = figment.merge(("ble.scan_timeout_ms", timeout));
        }

        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn figment(path: Option<&Path>) -> Result<Figment, ConfigError> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::FileSystem(format!(
                    "Configuration file not found: {}",
                    path.display()
                )))
            }
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        Ok(Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.ble.scan_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Scan timeout must be greater than 0".to_string(),
            ));
        }

        if self.cli.ready_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Ready timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Create example configuration file content
    pub fn example_config() -> Result<String, ConfigError> {
        let example = AppConfig {
            link: LinkConfig::new()
                .with_service_uuid("0x1234")
                .with_characteristic_uuid("0x5678"),
            ..Default::default()
        };

        toml::to_string_pretty(&example)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = AppConfig::default();
        assert_eq!(config.cli.prompt, "blelink> ");
        assert_eq!(config.ble.scan_timeout_ms, 5000);
        assert!(config.link.service_uuid.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.link.service_uuid = Some("0".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));

        let mut config = AppConfig::default();
        config.ble.scan_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cli.ready_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_config_generation() {
        let example = AppConfig::example_config().unwrap();
        assert!(example.contains("[link]"));
        assert!(example.contains("[ble]"));
        assert!(example.contains("[cli]"));
        assert!(example.contains("0x1234"));
    }
}
