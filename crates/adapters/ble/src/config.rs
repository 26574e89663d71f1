//! BLE transport configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the BLE transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Which host adapter to use, in the order the platform lists them.
    pub adapter_index: usize,
    /// Upper bound on establishing a link, in seconds.
    pub connect_timeout_secs: u64,
    /// Upper bound on enumerating services after connecting, in seconds.
    pub discovery_timeout_secs: u64,
}

impl BleConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            connect_timeout_secs: 10,
            discovery_timeout_secs: 15,
        }
    }
}
