//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `mipirobot.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::str::FromStr;

use serde::Deserialize;

use mipirobot_adapter_ble::BleConfig;
use mipirobot_adapter_virtual::VirtualConfig;
use mipirobot_app::config::ControllerConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session controller tunables.
    pub controller: ControllerConfig,
    /// Which wireless stack to drive.
    pub transport: TransportConfig,
    /// Host Bluetooth settings, used with `kind = "ble"`.
    pub ble: BleConfig,
    /// Simulated radio, used with `kind = "virtual"`.
    #[serde(rename = "virtual")]
    pub simulation: VirtualConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Transport selection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// The host Bluetooth LE adapter.
    #[default]
    Ble,
    /// An in-memory robot.
    Virtual,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ble" => Ok(Self::Ble),
            "virtual" => Ok(Self::Virtual),
            other => Err(ConfigError::Validation(format!(
                "unknown transport {other:?}, expected \"ble\" or \"virtual\""
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `mipirobot.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, an
    /// override cannot be parsed, or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("mipirobot.toml")?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = var("MIPIROBOT_TRANSPORT") {
            self.transport.kind = val.parse()?;
        }
        if let Some(val) = var("MIPIROBOT_SCAN_TIMEOUT_MS") {
            self.controller.scan_timeout_ms = val.parse().map_err(|_| {
                ConfigError::Validation(format!("MIPIROBOT_SCAN_TIMEOUT_MS is not a number: {val}"))
            })?;
        }
        if let Some(val) = var("MIPIROBOT_NAME_PREFIX") {
            self.controller.name_prefix = val;
        }
        if let Some(val) = var("MIPIROBOT_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.scan_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "scan timeout must be non-zero".to_string(),
            ));
        }
        if self.controller.name_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "device name prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "mipictl=info,mipirobot=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
