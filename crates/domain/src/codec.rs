//! Payload codec — commands and gain records to and from the wire.
//!
//! Every payload is UTF-8 text carried in standard base64:
//!
//! | Payload | Text before transport encoding |
//! |---------|--------------------------------|
//! | Command | `COMMAND_FORWARD`, `COMMAND_STOP`, … |
//! | Gains | `{"kp":12.0,"ki":0.8,"kd":0.15}` |
//!
//! Decoded gains are returned as-is; clamping is the parameter store's job.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::command::DirectionalCommand;
use crate::error::CodecError;
use crate::parameters::ParameterSet;

/// Gain record as it appears on the wire. Extra fields are ignored.
#[derive(Deserialize)]
struct GainRecord {
    kp: f64,
    ki: f64,
    kd: f64,
}

/// Apply the byte transport encoding (base64 of the raw bytes).
#[must_use]
pub fn transport_encode(raw: &[u8]) -> Vec<u8> {
    STANDARD.encode(raw).into_bytes()
}

/// Reverse [`transport_encode`].
///
/// # Errors
///
/// Returns [`CodecError::InvalidTransportEncoding`] when `encoded` is not
/// valid base64.
pub fn transport_decode(encoded: &[u8]) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(encoded)?)
}

/// Encode a directional command into its wire payload.
#[must_use]
pub fn encode_command(command: DirectionalCommand) -> Vec<u8> {
    transport_encode(command.token().as_bytes())
}

/// Encode a gain set into its wire payload.
#[must_use]
pub fn encode_parameters(parameters: &ParameterSet) -> Vec<u8> {
    let record = serde_json::json!({
        "kp": parameters.kp,
        "ki": parameters.ki,
        "kd": parameters.kd,
    });
    transport_encode(record.to_string().as_bytes())
}

/// Decode a gain set read from the parameter characteristic.
///
/// # Errors
///
/// Returns a [`CodecError`] when the payload is not base64, not UTF-8, or
/// not a record with numeric `kp`, `ki` and `kd` fields.
pub fn decode_parameters(encoded: &[u8]) -> Result<ParameterSet, CodecError> {
    let text = String::from_utf8(transport_decode(encoded)?)?;
    let record: GainRecord = serde_json::from_str(&text)?;
    Ok(ParameterSet::new(record.kp, record.ki, record.kd))
}
