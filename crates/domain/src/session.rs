//! Sessions — the single connected link to a robot, and the observable
//! controller snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::ActiveCommand;
use crate::error::OperationError;
use crate::id::SessionId;
use crate::parameters::ParameterSet;
use crate::peripheral::PeripheralDescriptor;
use crate::time::{Timestamp, now};

/// State of the session controller.
///
/// `Idle` and `Connected` are the steady states; the others are transient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        }
    }

    /// Whether a scan or a new connection may start from this state.
    #[must_use]
    pub fn accepts_new_link(self) -> bool {
        matches!(self, Self::Idle | Self::Scanning)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An established link to one robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub peripheral: PeripheralDescriptor,
    pub connected_at: Timestamp,
}

impl Session {
    #[must_use]
    pub fn start(peripheral: PeripheralDescriptor) -> Self {
        Self {
            id: SessionId::new(),
            peripheral,
            connected_at: now(),
        }
    }
}

/// Whether a session exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    NoSession,
    Active(Session),
}

impl SessionStatus {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::NoSession => None,
            Self::Active(session) => Some(session),
        }
    }
}

/// Three-way status indicator for a status pill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Connected,
    Scanning,
    Disconnected,
}

/// Everything an observer needs to render the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub session: SessionStatus,
    pub discovered: Vec<PeripheralDescriptor>,
    pub active_command: ActiveCommand,
    pub parameters: ParameterSet,
    pub draft: ParameterSet,
    pub writing: bool,
    pub last_error: Option<OperationError>,
}

impl SessionSnapshot {
    /// Connected wins over scanning; anything else reads as disconnected.
    #[must_use]
    pub fn indicator(&self) -> Indicator {
        if self.session.session().is_some() {
            Indicator::Connected
        } else if self.state == ConnectionState::Scanning {
            Indicator::Scanning
        } else {
            Indicator::Disconnected
        }
    }
}
