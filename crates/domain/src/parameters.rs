//! Control-loop gains and their bounds.
//!
//! | Gain | Range | Default | Stepper increment |
//! |------|-------|---------|-------------------|
//! | `kp` | 0 – 40 | 12 | 0.5 |
//! | `ki` | 0 – 5 | 0.8 | 0.05 |
//! | `kd` | 0 – 5 | 0.15 | 0.05 |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One of the three gains of the robot's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gain {
    Proportional,
    Integral,
    Derivative,
}

impl Gain {
    pub const ALL: [Self; 3] = [Self::Proportional, Self::Integral, Self::Derivative];

    /// Field name in the wire record (`kp`, `ki`, `kd`).
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Proportional => "kp",
            Self::Integral => "ki",
            Self::Derivative => "kd",
        }
    }

    /// Closed range the gain is held to.
    #[must_use]
    pub fn bounds(self) -> GainBounds {
        match self {
            Self::Proportional => GainBounds { min: 0.0, max: 40.0 },
            Self::Integral | Self::Derivative => GainBounds { min: 0.0, max: 5.0 },
        }
    }

    /// Increment applied by one press of a stepper button.
    #[must_use]
    pub fn step(self) -> f64 {
        match self {
            Self::Proportional => 0.5,
            Self::Integral | Self::Derivative => 0.05,
        }
    }
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Gain {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|gain| gain.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownGain(s.to_owned()))
    }
}

/// Inclusive lower and upper bound of a gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainBounds {
    pub min: f64,
    pub max: f64,
}

impl GainBounds {
    /// Force `value` into the range. `NaN` maps to the lower bound.
    #[must_use]
    pub fn clamp(self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl fmt::Display for GainBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.min, self.max)
    }
}

/// The three gains, as last known or as desired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            kp: 12.0,
            ki: 0.8,
            kd: 0.15,
        }
    }
}

impl ParameterSet {
    #[must_use]
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    #[must_use]
    pub fn get(&self, gain: Gain) -> f64 {
        match gain {
            Gain::Proportional => self.kp,
            Gain::Integral => self.ki,
            Gain::Derivative => self.kd,
        }
    }

    /// Return a copy with one gain replaced, without clamping.
    #[must_use]
    pub fn with(mut self, gain: Gain, value: f64) -> Self {
        match gain {
            Gain::Proportional => self.kp = value,
            Gain::Integral => self.ki = value,
            Gain::Derivative => self.kd = value,
        }
        self
    }

    /// Clamp every gain into its bounds.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            kp: Gain::Proportional.bounds().clamp(self.kp),
            ki: Gain::Integral.bounds().clamp(self.ki),
            kd: Gain::Derivative.bounds().clamp(self.kd),
        }
    }

    #[must_use]
    pub fn is_within_bounds(&self) -> bool {
        Gain::ALL
            .into_iter()
            .all(|gain| gain.bounds().contains(self.get(gain)))
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kp={} ki={} kd={}", self.kp, self.ki, self.kd)
    }
}
