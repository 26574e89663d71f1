//! Configuration of the simulated radio.

use std::time::Duration;

use serde::Deserialize;

use mipirobot_domain::parameters::ParameterSet;

/// Simulated peripherals and link timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    /// Peripherals within range of the simulated radio.
    pub robots: Vec<VirtualRobotConfig>,
    /// Time every write or read takes to be acknowledged, in milliseconds.
    pub write_latency_ms: u64,
    /// Pause between two rounds of advertisements while scanning, in
    /// milliseconds.
    pub advertise_interval_ms: u64,
}

impl VirtualConfig {
    #[must_use]
    pub fn write_latency(&self) -> Duration {
        Duration::from_millis(self.write_latency_ms)
    }

    #[must_use]
    pub fn advertise_interval(&self) -> Duration {
        Duration::from_millis(self.advertise_interval_ms)
    }
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            robots: vec![
                VirtualRobotConfig {
                    id: "virtual-robot-1".into(),
                    name: Some("MIPIRobot-Sim".into()),
                    advertises_service: true,
                    parameters: ParameterSet::default(),
                },
                VirtualRobotConfig {
                    id: "virtual-speaker".into(),
                    name: Some("Speaker-42".into()),
                    advertises_service: false,
                    parameters: ParameterSet::default(),
                },
            ],
            write_latency_ms: 20,
            advertise_interval_ms: 500,
        }
    }
}

/// One simulated peripheral.
#[derive(Debug, Clone, Deserialize)]
pub struct VirtualRobotConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the peripheral exposes the robot service. Peripherals that do
    /// not are bystanders: discoverable by a loose filter, unusable once
    /// connected.
    #[serde(default = "default_advertises_service")]
    pub advertises_service: bool,
    /// Gains stored on the peripheral at start-up.
    #[serde(default)]
    pub parameters: ParameterSet,
}

fn default_advertises_service() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_one_robot_and_one_bystander_by_default() {
        let config = VirtualConfig::default();
        assert_eq!(config.robots.len(), 2);
        assert!(config.robots[0].advertises_service);
        assert!(!config.robots[1].advertises_service);
        assert_eq!(config.write_latency(), Duration::from_millis(20));
    }

    #[test]
    fn should_deserialize_robots_from_toml() {
        let toml = r#"
            write_latency_ms = 5

            [[robots]]
            id = "bench"
            name = "MIPIRobot-Bench"
            parameters = { kp = 20.0, ki = 1.0, kd = 0.5 }

            [[robots]]
            id = "anonymous"
        "#;
        let config: VirtualConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.write_latency_ms, 5);
        assert_eq!(config.advertise_interval_ms, 500);
        assert_eq!(config.robots.len(), 2);
        assert_eq!(config.robots[0].parameters, ParameterSet::new(20.0, 1.0, 0.5));
        assert!(config.robots[1].name.is_none());
        assert!(config.robots[1].advertises_service);
        assert_eq!(config.robots[1].parameters, ParameterSet::default());
    }
}
