//! GATT helpers for the robot's characteristics.
//!
//! Payloads reach the adapter transport-encoded; the air carries the raw
//! bytes underneath, so writes decode and reads encode.

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;

use mipirobot_domain::codec;
use mipirobot_domain::protocol::{CharacteristicAddress, SERVICE_UUID};

use crate::error::BleError;

/// First required attribute missing from `present`, given as
/// `(service, characteristic)` pairs.
pub(crate) fn missing_attribute(
    present: impl IntoIterator<Item = (uuid::Uuid, uuid::Uuid)>,
) -> Option<uuid::Uuid> {
    let present: Vec<_> = present.into_iter().collect();
    if !present.iter().any(|(service, _)| *service == SERVICE_UUID) {
        return Some(SERVICE_UUID);
    }
    [CharacteristicAddress::COMMAND, CharacteristicAddress::PARAMETERS]
        .into_iter()
        .find(|address| !present.contains(&(address.service, address.characteristic)))
        .map(|address| address.characteristic)
}

/// Check a peripheral that has discovered its services for the robot
/// service and both of its characteristics.
///
/// # Errors
///
/// Returns [`BleError::MissingAttribute`] naming the first absent one.
pub(crate) fn ensure_robot_attributes(peripheral: &Peripheral) -> Result<(), BleError> {
    let present = peripheral
        .characteristics()
        .into_iter()
        .map(|c| (c.service_uuid, c.uuid));
    match missing_attribute(present) {
        Some(uuid) => Err(BleError::MissingAttribute(uuid)),
        None => Ok(()),
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    address: CharacteristicAddress,
) -> Result<Characteristic, BleError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.service_uuid == address.service && c.uuid == address.characteristic)
        .ok_or(BleError::MissingAttribute(address.characteristic))
}

/// Write a transport-encoded payload and wait for the acknowledgement.
///
/// # Errors
///
/// Returns [`BleError::Encoding`] for a payload that is not transport-encoded,
/// [`BleError::MissingAttribute`] when the characteristic is absent, or the
/// stack error.
pub(crate) async fn write(
    peripheral: &Peripheral,
    address: CharacteristicAddress,
    payload: &[u8],
) -> Result<(), BleError> {
    let raw = codec::transport_decode(payload)?;
    let characteristic = find_characteristic(peripheral, address)?;
    peripheral
        .write(&characteristic, &raw, WriteType::WithResponse)
        .await?;
    Ok(())
}

/// Read a characteristic and return its value transport-encoded.
///
/// # Errors
///
/// Returns [`BleError::MissingAttribute`] when the characteristic is absent,
/// or the stack error.
pub(crate) async fn read(
    peripheral: &Peripheral,
    address: CharacteristicAddress,
) -> Result<Vec<u8>, BleError> {
    let characteristic = find_characteristic(peripheral, address)?;
    let raw = peripheral.read(&characteristic).await?;
    Ok(codec::transport_encode(&raw))
}
