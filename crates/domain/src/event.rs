//! Event — an immutable record of an observable controller change.
//!
//! The session controller publishes one event per change; observers rebuild
//! their view from the stream or read a full
//! [`SessionSnapshot`](crate::session::SessionSnapshot).

use serde::{Deserialize, Serialize};

use crate::command::ActiveCommand;
use crate::error::OperationError;
use crate::id::EventId;
use crate::parameters::ParameterSet;
use crate::peripheral::PeripheralDescriptor;
use crate::session::{ConnectionState, SessionStatus};
use crate::time::{Timestamp, now};

/// What changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The discovered set was emptied because a new scan started.
    DiscoveryReset,
    PeripheralDiscovered(PeripheralDescriptor),
    ConnectionChanged {
        state: ConnectionState,
        session: SessionStatus,
    },
    ActiveCommandChanged(ActiveCommand),
    ParametersChanged(ParameterSet),
    DraftChanged(ParameterSet),
    /// A command write started (`true`) or finished (`false`).
    WritingChanged(bool),
    OperationFailed(OperationError),
}

/// A published [`SessionEvent`] with identity and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: SessionEvent,
}

impl Event {
    #[must_use]
    pub fn new(payload: SessionEvent) -> Self {
        Self {
            id: EventId::new(),
            timestamp: now(),
            payload,
        }
    }
}

impl From<SessionEvent> for Event {
    fn from(payload: SessionEvent) -> Self {
        Self::new(payload)
    }
}
