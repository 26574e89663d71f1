//! Simulated robot — a peripheral with a command and a parameter
//! characteristic.

use std::sync::{Mutex, MutexGuard, PoisonError};

use mipirobot_app::ports::Advertisement;
use mipirobot_domain::codec;
use mipirobot_domain::command::DirectionalCommand;
use mipirobot_domain::error::TransportError;
use mipirobot_domain::id::PeripheralId;
use mipirobot_domain::parameters::ParameterSet;
use mipirobot_domain::protocol::{CharacteristicAddress, SERVICE_UUID};

use crate::config::VirtualRobotConfig;

/// Battery service, advertised by bystanders instead of the robot service.
const BATTERY_SERVICE_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x0000_180f_0000_1000_8000_0080_5f9b_34fb);

/// A simulated peripheral and the values of its characteristics.
pub struct VirtualRobot {
    id: PeripheralId,
    name: Option<String>,
    advertises_service: bool,
    characteristics: Mutex<Characteristics>,
}

struct Characteristics {
    /// Parameter characteristic value, transport-encoded as on the air.
    parameters: Vec<u8>,
    /// Every command token received, oldest first.
    commands: Vec<DirectionalCommand>,
}

impl VirtualRobot {
    #[must_use]
    pub fn new(config: &VirtualRobotConfig) -> Self {
        Self {
            id: PeripheralId::new(config.id.clone()),
            name: config.name.clone(),
            advertises_service: config.advertises_service,
            characteristics: Mutex::new(Characteristics {
                parameters: codec::encode_parameters(&config.parameters),
                commands: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    #[must_use]
    pub fn advertises_service(&self) -> bool {
        self.advertises_service
    }

    #[must_use]
    pub fn advertisement(&self) -> Advertisement {
        let service = if self.advertises_service {
            SERVICE_UUID
        } else {
            BATTERY_SERVICE_UUID
        };
        Advertisement {
            id: self.id.clone(),
            local_name: self.name.clone(),
            services: vec![service],
        }
    }

    /// Accept a write the way the firmware does.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Rejected`] for payloads the firmware would
    /// not acknowledge, or [`TransportError::MissingCapability`] when the
    /// characteristic does not exist.
    pub fn write(&self, address: CharacteristicAddress, payload: &[u8]) -> Result<(), TransportError> {
        self.require(address)?;
        if address == CharacteristicAddress::COMMAND {
            let raw = codec::transport_decode(payload)
                .map_err(|err| TransportError::Rejected(err.to_string()))?;
            let command = DirectionalCommand::ALL
                .into_iter()
                .find(|command| command.token().as_bytes() == raw.as_slice())
                .ok_or_else(|| {
                    TransportError::Rejected(format!(
                        "unknown command token {}",
                        String::from_utf8_lossy(&raw)
                    ))
                })?;
            self.lock().commands.push(command);
            tracing::debug!(robot = %self.id, %command, "virtual robot received command");
        } else {
            let parameters = codec::decode_parameters(payload)
                .map_err(|err| TransportError::Rejected(err.to_string()))?;
            self.lock().parameters = payload.to_vec();
            tracing::debug!(robot = %self.id, %parameters, "virtual robot stored gains");
        }
        Ok(())
    }

    /// Read a characteristic value.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Rejected`] for the write-only command
    /// characteristic.
    pub fn read(&self, address: CharacteristicAddress) -> Result<Vec<u8>, TransportError> {
        self.require(address)?;
        if address == CharacteristicAddress::COMMAND {
            return Err(TransportError::Rejected(
                "command characteristic is write-only".into(),
            ));
        }
        Ok(self.lock().parameters.clone())
    }

    /// Commands received so far, oldest first.
    #[must_use]
    pub fn commands(&self) -> Vec<DirectionalCommand> {
        self.lock().commands.clone()
    }

    /// Gains stored on the robot, when the stored value decodes.
    #[must_use]
    pub fn parameters(&self) -> Option<ParameterSet> {
        codec::decode_parameters(&self.lock().parameters).ok()
    }

    /// Overwrite the raw parameter characteristic value, bypassing
    /// validation, as misbehaving firmware would.
    pub fn set_raw_parameters(&self, payload: Vec<u8>) {
        self.lock().parameters = payload;
    }

    fn require(&self, address: CharacteristicAddress) -> Result<(), TransportError> {
        let known = address == CharacteristicAddress::COMMAND
            || address == CharacteristicAddress::PARAMETERS;
        if self.advertises_service && known {
            Ok(())
        } else {
            Err(TransportError::MissingCapability(address.characteristic))
        }
    }

    fn lock(&self) -> MutexGuard<'_, Characteristics> {
        self.characteristics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
