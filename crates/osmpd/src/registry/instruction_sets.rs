//! Enabled/disabled state of instruction sets.

use std::sync::{Arc, PoisonError, RwLock};

use osmp_protocol::STANDARD_INSTRUCTION_SET;
use tracing::info;

use crate::dispatch::DISPATCH_TARGET;

/// A named vocabulary and whether it is currently enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionSet {
    name: String,
    enabled: bool,
}

impl InstructionSet {
    /// Instruction set identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether requests may target this instruction set.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Immutable view of every known instruction set in insertion order.
///
/// The dispatcher performs its capability check against a snapshot, so an
/// administrative change never revokes capability from a request that has
/// already passed the check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionSetSnapshot {
    sets: Vec<InstructionSet>,
}

impl InstructionSetSnapshot {
    /// Returns true when `name` is known and enabled.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.sets.iter().any(|set| set.name == name && set.enabled)
    }

    /// Returns true when `name` has been declared or enabled.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sets.iter().any(|set| set.name == name)
    }

    /// Enabled identifiers in insertion order.
    #[must_use]
    pub fn list_enabled(&self) -> Vec<String> {
        self.sets
            .iter()
            .filter(|set| set.enabled)
            .map(|set| set.name.clone())
            .collect()
    }

    /// Every known instruction set in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &InstructionSet> {
        self.sets.iter()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sets.iter().position(|set| set.name == name)
    }
}

/// Registry of instruction sets.
///
/// Changes are serialised by an internal lock and published as a fresh
/// [`InstructionSetSnapshot`]; readers never observe a half-applied change.
#[derive(Debug)]
pub struct InstructionSetRegistry {
    current: RwLock<Arc<InstructionSetSnapshot>>,
}

impl Default for InstructionSetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionSetRegistry {
    /// Creates a registry with only the `standard` instruction set enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_enabled([STANDARD_INSTRUCTION_SET])
    }

    /// Creates a registry enabling `names` in order.
    ///
    /// `standard` is always known; it is disabled when absent from `names`.
    #[must_use]
    pub fn with_enabled<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sets: Vec<InstructionSet> = Vec::new();
        for name in names {
            let name = name.into();
            if !sets.iter().any(|set| set.name == name) {
                sets.push(InstructionSet {
                    name,
                    enabled: true,
                });
            }
        }
        if !sets.iter().any(|set| set.name == STANDARD_INSTRUCTION_SET) {
            sets.push(InstructionSet {
                name: STANDARD_INSTRUCTION_SET.to_owned(),
                enabled: false,
            });
        }
        Self {
            current: RwLock::new(Arc::new(InstructionSetSnapshot { sets })),
        }
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<InstructionSetSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Returns true when `name` is enabled.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.snapshot().is_enabled(name)
    }

    /// Enabled identifiers in insertion order.
    #[must_use]
    pub fn list_enabled(&self) -> Vec<String> {
        self.snapshot().list_enabled()
    }

    /// Enables `name`, registering it when unknown.
    ///
    /// Returns true when the state changed; repeated calls are no-ops.
    pub fn enable(&self, name: &str) -> bool {
        let changed = self.modify(|sets| match sets.position(name) {
            Some(index) => sets
                .sets
                .get_mut(index)
                .is_some_and(|set| !std::mem::replace(&mut set.enabled, true)),
            None => {
                sets.sets.push(InstructionSet {
                    name: name.to_owned(),
                    enabled: true,
                });
                true
            }
        });
        if changed {
            info!(target: DISPATCH_TARGET, instruction_set = name, "instruction set enabled");
        }
        changed
    }

    /// Disables `name`.
    ///
    /// Returns true when the state changed. Disabling an unknown or already
    /// disabled instruction set is a no-op.
    pub fn disable(&self, name: &str) -> bool {
        let changed = self.modify(|sets| {
            sets.position(name)
                .and_then(|index| sets.sets.get_mut(index))
                .is_some_and(|set| std::mem::replace(&mut set.enabled, false))
        });
        if changed {
            info!(target: DISPATCH_TARGET, instruction_set = name, "instruction set disabled");
        }
        changed
    }

    /// Makes `name` known without enabling it.
    pub(crate) fn declare(&self, name: &str) {
        self.modify(|sets| {
            if sets.contains(name) {
                return false;
            }
            sets.sets.push(InstructionSet {
                name: name.to_owned(),
                enabled: false,
            });
            true
        });
    }

    fn modify(&self, change: impl FnOnce(&mut InstructionSetSnapshot) -> bool) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = InstructionSetSnapshot::clone(&current);
        let changed = change(&mut next);
        if changed {
            *current = Arc::new(next);
        }
        changed
    }
}
