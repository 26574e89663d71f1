//! Directional commands — the motion the operator is currently holding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A single motion instruction sent to the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionalCommand {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl DirectionalCommand {
    /// Every command, in display order.
    pub const ALL: [Self; 5] = [
        Self::Forward,
        Self::Backward,
        Self::Left,
        Self::Right,
        Self::Stop,
    ];

    /// Textual token the firmware understands for this command.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Forward => "COMMAND_FORWARD",
            Self::Backward => "COMMAND_BACKWARD",
            Self::Left => "COMMAND_LEFT",
            Self::Right => "COMMAND_RIGHT",
            Self::Stop => "COMMAND_STOP",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for DirectionalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DirectionalCommand {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownCommand(s.to_owned()))
    }
}

/// The "currently held" input indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "command", rename_all = "snake_case")]
pub enum ActiveCommand {
    #[default]
    None,
    Directional(DirectionalCommand),
}

impl ActiveCommand {
    #[must_use]
    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<Option<DirectionalCommand>> for ActiveCommand {
    fn from(value: Option<DirectionalCommand>) -> Self {
        value.map_or(Self::None, Self::Directional)
    }
}
