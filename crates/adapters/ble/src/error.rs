//! BLE adapter error types.

use mipirobot_domain::error::{CodecError, TransportError};

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// The host adapter is switched off.
    #[error("bluetooth adapter is powered off")]
    PoweredOff,

    /// A btleplug call failed.
    #[error("bluetooth stack error")]
    Bluetooth(#[from] btleplug::Error),

    /// The peripheral was never seen by a scan on this adapter.
    #[error("unknown peripheral {0}")]
    UnknownPeripheral(String),

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// A service or characteristic the robot must expose is absent.
    #[error("missing GATT attribute {0}")]
    MissingAttribute(uuid::Uuid),

    /// A payload handed to the adapter was not transport-encoded.
    #[error("invalid payload encoding")]
    Encoding(#[from] CodecError),
}

impl From<BleError> for TransportError {
    fn from(err: BleError) -> Self {
        match err {
            BleError::NotAvailable => Self::Unavailable(err.to_string()),
            BleError::PoweredOff => Self::PermissionDenied(err.to_string()),
            BleError::Bluetooth(inner) => match inner {
                btleplug::Error::PermissionDenied => {
                    Self::PermissionDenied("bluetooth access denied".into())
                }
                btleplug::Error::DeviceNotFound => Self::PeripheralNotFound(inner.to_string()),
                btleplug::Error::NotConnected => Self::LinkLost,
                btleplug::Error::TimedOut(_) => Self::Timeout {
                    operation: "bluetooth request",
                },
                other => Self::Unavailable(other.to_string()),
            },
            BleError::UnknownPeripheral(id) => Self::PeripheralNotFound(id),
            BleError::Timeout { operation } => Self::Timeout { operation },
            BleError::MissingAttribute(uuid) => Self::MissingCapability(uuid),
            BleError::Encoding(_) => Self::Rejected(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_available_error() {
        let err = BleError::NotAvailable;
        assert_eq!(err.to_string(), "no BLE adapter available");
    }

    #[test]
    fn should_display_timeout_error() {
        let err = BleError::Timeout {
            operation: "connect",
        };
        assert_eq!(err.to_string(), "connect timed out");
    }

    #[test]
    fn should_convert_powered_off_to_permission_denied() {
        let err: TransportError = BleError::PoweredOff.into();
        assert!(matches!(err, TransportError::PermissionDenied(_)));
    }

    #[test]
    fn should_convert_device_not_found_to_peripheral_not_found() {
        let err: TransportError = BleError::Bluetooth(btleplug::Error::DeviceNotFound).into();
        assert!(matches!(err, TransportError::PeripheralNotFound(_)));
    }

    #[test]
    fn should_convert_not_connected_to_link_lost() {
        let err: TransportError = BleError::Bluetooth(btleplug::Error::NotConnected).into();
        assert_eq!(err, TransportError::LinkLost);
    }

    #[test]
    fn should_convert_missing_attribute_to_missing_capability() {
        let uuid = uuid::Uuid::from_u128(0x1234);
        let err: TransportError = BleError::MissingAttribute(uuid).into();
        assert_eq!(err, TransportError::MissingCapability(uuid));
    }

    #[test]
    fn should_keep_timeout_operation() {
        let err: TransportError = BleError::Timeout {
            operation: "connect",
        }
        .into();
        assert_eq!(
            err,
            TransportError::Timeout {
                operation: "connect"
            }
        );
    }
}
