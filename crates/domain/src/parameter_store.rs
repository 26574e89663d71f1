//! Parameter store — the current gain set and the operator's draft.
//!
//! The draft is free-form: [`ParameterStore::set_draft`] never clamps, so a
//! value being typed is not rewritten under the operator's fingers. Clamping
//! happens at the boundaries: [`commit`](ParameterStore::commit) and
//! [`apply_received`](ParameterStore::apply_received). Whenever the current
//! set changes the draft is reset to it.

use crate::parameters::{Gain, ParameterSet};

/// Direction of a stepper press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Down,
    Up,
}

impl StepDirection {
    fn sign(self) -> f64 {
        match self {
            Self::Down => -1.0,
            Self::Up => 1.0,
        }
    }
}

/// In-memory record of the last known gains and the uncommitted draft.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    current: ParameterSet,
    draft: ParameterSet,
}

impl ParameterStore {
    /// A store holding the documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> ParameterSet {
        self.current
    }

    #[must_use]
    pub fn draft(&self) -> ParameterSet {
        self.draft
    }

    /// Merge a single-field edit into the draft, unclamped.
    pub fn set_draft(&mut self, gain: Gain, value: f64) -> ParameterSet {
        self.draft = self.draft.with(gain, value);
        self.draft
    }

    /// Nudge a draft field by its stepper increment, clamped and rounded to
    /// three decimals.
    pub fn step_draft(&mut self, gain: Gain, direction: StepDirection) -> ParameterSet {
        let stepped = self.draft.get(gain) + direction.sign() * gain.step();
        let clamped = gain.bounds().clamp(stepped);
        let rounded = (clamped * 1000.0).round() / 1000.0;
        self.set_draft(gain, rounded)
    }

    /// Clamp `draft` and make it the current set.
    pub fn commit(&mut self, draft: ParameterSet) -> ParameterSet {
        self.replace_current(draft.clamped())
    }

    /// Clamp a set read back from the robot and make it the current set.
    pub fn apply_received(&mut self, received: ParameterSet) -> ParameterSet {
        self.replace_current(received.clamped())
    }

    /// Return to the documented defaults.
    pub fn reset(&mut self) -> ParameterSet {
        self.replace_current(ParameterSet::default())
    }

    fn replace_current(&mut self, next: ParameterSet) -> ParameterSet {
        self.current = next;
        self.draft = next;
        next
    }
}
