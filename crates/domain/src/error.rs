//! Common error types used across the workspace.
//!
//! Each layer has its own typed error and converts with `#[from]`:
//!
//! - [`TransportError`] — what a transport adapter reports.
//! - [`CodecError`] — a wire payload could not be decoded.
//! - [`SessionError`] — what a session-controller operation returns.
//!
//! Observers never see these directly; they receive an [`OperationError`],
//! a clonable `(kind, message)` pair.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::ConnectionState;

/// Invalid operator input (unknown command or gain names).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown directional command {0:?}")]
    UnknownCommand(String),

    #[error("unknown gain {0:?}, expected kp, ki or kd")]
    UnknownGain(String),
}

/// Failure reported by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The platform has not authorised wireless access.
    #[error("wireless permission not granted: {0}")]
    PermissionDenied(String),

    /// The radio or adapter cannot be used.
    #[error("wireless adapter unavailable: {0}")]
    Unavailable(String),

    #[error("peripheral {0} not found")]
    PeripheralNotFound(String),

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// The stack or the peripheral refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The peripheral does not expose a required service or characteristic.
    #[error("missing capability {0}")]
    MissingCapability(uuid::Uuid),

    #[error("link to peripheral lost")]
    LinkLost,
}

/// A wire payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload is not valid base64")]
    InvalidTransportEncoding(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8")]
    InvalidText(#[from] std::string::FromUtf8Error),

    #[error("payload is not a gain record")]
    InvalidRecord(#[from] serde_json::Error),
}

/// Error returned by session-controller operations.
///
/// `NoPeripheralAvailable`, `NotConnected` and `Busy` are local validation
/// failures raised before any transport call.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("wireless permission denied")]
    PermissionDenied(#[source] TransportError),

    #[error("scan failed")]
    ScanFailed(#[source] TransportError),

    #[error("no peripheral available, scan first")]
    NoPeripheralAvailable,

    #[error("connection failed")]
    ConnectFailed(#[source] TransportError),

    #[error("capability discovery failed")]
    CapabilityDiscoveryFailed(#[source] TransportError),

    #[error("not connected to a robot")]
    NotConnected,

    #[error("controller busy while {state}")]
    Busy { state: ConnectionState },

    #[error("write failed")]
    WriteFailed(#[source] TransportError),

    #[error("read failed")]
    ReadFailed(#[source] TransportError),

    #[error("malformed parameter payload")]
    MalformedParameterPayload(#[source] CodecError),

    #[error("disconnect failed")]
    DisconnectFailed(#[source] TransportError),
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::ScanFailed(_) => ErrorKind::ScanFailed,
            Self::NoPeripheralAvailable => ErrorKind::NoPeripheralAvailable,
            Self::ConnectFailed(_) => ErrorKind::ConnectFailed,
            Self::CapabilityDiscoveryFailed(_) => ErrorKind::CapabilityDiscoveryFailed,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::WriteFailed(_) => ErrorKind::WriteFailed,
            Self::ReadFailed(_) => ErrorKind::ReadFailed,
            Self::MalformedParameterPayload(_) => ErrorKind::MalformedParameterPayload,
            Self::DisconnectFailed(_) => ErrorKind::DisconnectFailed,
        }
    }

    /// Render the error and its source chain on one line.
    #[must_use]
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// Fieldless mirror of [`SessionError`] for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    ScanFailed,
    NoPeripheralAvailable,
    ConnectFailed,
    CapabilityDiscoveryFailed,
    NotConnected,
    Busy,
    WriteFailed,
    ReadFailed,
    MalformedParameterPayload,
    DisconnectFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PermissionDenied => "permission_denied",
            Self::ScanFailed => "scan_failed",
            Self::NoPeripheralAvailable => "no_peripheral_available",
            Self::ConnectFailed => "connect_failed",
            Self::CapabilityDiscoveryFailed => "capability_discovery_failed",
            Self::NotConnected => "not_connected",
            Self::Busy => "busy",
            Self::WriteFailed => "write_failed",
            Self::ReadFailed => "read_failed",
            Self::MalformedParameterPayload => "malformed_parameter_payload",
            Self::DisconnectFailed => "disconnect_failed",
        };
        f.write_str(text)
    }
}

/// The last operation error, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SessionError> for OperationError {
    fn from(err: &SessionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.report(),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
