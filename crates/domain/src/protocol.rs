//! Wire protocol constants shared with the robot firmware.
//!
//! | Item | Value |
//! |------|-------|
//! | Service | `12345678-1234-5678-1234-56789abcdef0` |
//! | Command characteristic | `12345678-1234-5678-1234-56789abcdef1` |
//! | Parameter characteristic | `12345678-1234-5678-1234-56789abcdef2` |
//! | Advertised name prefix | `MIPIRobot` |
//! | Scan deadline | 15 000 ms |
//!
//! These values must match the firmware exactly.

use std::time::Duration;

/// GATT service exposed by the robot.
pub const SERVICE_UUID: uuid::Uuid = uuid::Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def0);

/// Characteristic receiving directional command tokens.
pub const COMMAND_CHARACTERISTIC_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def1);

/// Characteristic holding the control-loop gain record (read/write).
pub const PARAMETER_CHARACTERISTIC_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x1234_5678_1234_5678_1234_5678_9abc_def2);

/// Advertised local names of robots start with this prefix.
pub const DEVICE_NAME_PREFIX: &str = "MIPIRobot";

/// Default time a scan runs before it is stopped automatically.
pub const SCAN_TIMEOUT: Duration = Duration::from_millis(15_000);

/// A characteristic addressed by its parent service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicAddress {
    pub service: uuid::Uuid,
    pub characteristic: uuid::Uuid,
}

impl CharacteristicAddress {
    /// The command characteristic of the robot service.
    pub const COMMAND: Self = Self {
        service: SERVICE_UUID,
        characteristic: COMMAND_CHARACTERISTIC_UUID,
    };

    /// The parameter characteristic of the robot service.
    pub const PARAMETERS: Self = Self {
        service: SERVICE_UUID,
        characteristic: PARAMETER_CHARACTERISTIC_UUID,
    };
}
