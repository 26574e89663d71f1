//! Peripherals — robots reported by a scan.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::id::PeripheralId;
use crate::time::{Timestamp, now};

/// A peripheral that passed the discovery filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralDescriptor {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub discovered_at: Timestamp,
}

impl PeripheralDescriptor {
    /// Describe a peripheral seen just now.
    #[must_use]
    pub fn new(id: PeripheralId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            discovered_at: now(),
        }
    }

    /// Name to show the operator, falling back to the identifier.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Whether an advertised local name belongs to a robot.
///
/// Peripherals that advertise no name never match.
#[must_use]
pub fn name_matches(name: Option<&str>, prefix: &str) -> bool {
    name.is_some_and(|name| name.starts_with(prefix))
}

/// Discovered peripherals, de-duplicated by identifier, in order of first sight.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredPeripherals {
    entries: Vec<PeripheralDescriptor>,
    seen: HashSet<PeripheralId>,
}

impl DiscoveredPeripherals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `peripheral` unless its identifier is already known.
    ///
    /// Returns `true` when the set grew.
    pub fn insert(&mut self, peripheral: PeripheralDescriptor) -> bool {
        if !self.seen.insert(peripheral.id.clone()) {
            return false;
        }
        self.entries.push(peripheral);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }

    #[must_use]
    pub fn first(&self) -> Option<&PeripheralDescriptor> {
        self.entries.first()
    }

    #[must_use]
    pub fn get(&self, id: &PeripheralId) -> Option<&PeripheralDescriptor> {
        self.entries.iter().find(|p| &p.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &PeripheralId) -> bool {
        self.seen.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeripheralDescriptor> {
        self.entries.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<PeripheralDescriptor> {
        self.entries.clone()
    }
}
