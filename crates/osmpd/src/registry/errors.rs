//! Error types for registration and lookup.

use osmp_protocol::ErrorKind;
use thiserror::Error;

/// Errors raised by the command and event registries.
///
/// `Duplicate*` variants are raised while modules register and are fatal to
/// startup; `Unknown*` variants are raised by lookups at request time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A command name or alias is already taken in the instruction set.
    #[error("command '{name}' is already registered in instruction set '{instruction_set}'")]
    DuplicateCommand {
        /// Owning instruction set.
        instruction_set: String,
        /// Colliding name or alias.
        name: String,
    },
    /// An event name is already taken in the instruction set.
    #[error("event '{name}' is already registered in instruction set '{instruction_set}'")]
    DuplicateEvent {
        /// Owning instruction set.
        instruction_set: String,
        /// Colliding event name.
        name: String,
    },
    /// No command with this name or alias exists in the instruction set.
    #[error("unknown command '{name}' in instruction set '{instruction_set}'")]
    UnknownCommand {
        /// Requested instruction set.
        instruction_set: String,
        /// Requested command name.
        name: String,
    },
    /// No event with this name exists in the instruction set.
    #[error("unknown event '{name}' in instruction set '{instruction_set}'")]
    UnknownEvent {
        /// Requested instruction set.
        instruction_set: String,
        /// Requested event name.
        name: String,
    },
    /// Names must be non-empty and free of surrounding whitespace.
    #[error("invalid {what} name '{name}'")]
    InvalidName {
        /// What was being named.
        what: &'static str,
        /// Rejected name.
        name: String,
    },
}

impl RegistryError {
    /// Creates a duplicate command error.
    pub fn duplicate_command(instruction_set: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DuplicateCommand {
            instruction_set: instruction_set.into(),
            name: name.into(),
        }
    }

    /// Creates a duplicate event error.
    pub fn duplicate_event(instruction_set: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DuplicateEvent {
            instruction_set: instruction_set.into(),
            name: name.into(),
        }
    }

    /// Creates an unknown command error.
    pub fn unknown_command(instruction_set: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownCommand {
            instruction_set: instruction_set.into(),
            name: name.into(),
        }
    }

    /// Creates an unknown event error.
    pub fn unknown_event(instruction_set: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownEvent {
            instruction_set: instruction_set.into(),
            name: name.into(),
        }
    }

    /// Protocol error kind reported to clients.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateCommand { .. } => ErrorKind::DuplicateCommand,
            Self::DuplicateEvent { .. } => ErrorKind::DuplicateEvent,
            Self::UnknownCommand { .. } => ErrorKind::UnknownCommand,
            Self::UnknownEvent { .. } => ErrorKind::UnknownEvent,
            Self::InvalidName { .. } => ErrorKind::InternalError,
        }
    }
}

/// Rejects empty names and names with surrounding whitespace.
pub(super) fn check_name(what: &'static str, name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.trim() != name {
        return Err(RegistryError::InvalidName {
            what,
            name: name.to_owned(),
        });
    }
    Ok(())
}
