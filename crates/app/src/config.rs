//! Session controller configuration.

use std::time::Duration;

use serde::Deserialize;

use mipirobot_domain::protocol::{DEVICE_NAME_PREFIX, SCAN_TIMEOUT, SERVICE_UUID};

/// Tunables of the session controller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// How long a scan runs before it stops on its own, in milliseconds.
    pub scan_timeout_ms: u64,
    /// Advertised local names must start with this prefix.
    pub name_prefix: String,
    /// Advertisements must list this service.
    pub service: uuid::Uuid,
}

impl ControllerConfig {
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: u64::try_from(SCAN_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            name_prefix: DEVICE_NAME_PREFIX.to_string(),
            service: SERVICE_UUID,
        }
    }
}
