//! Registration surface used by command modules at startup.

use super::{CommandDescriptor, EventDescriptor, RegistryError};

/// Sink for command and event registrations.
///
/// Implemented by the dispatcher builder; registrations are only possible
/// before the dispatcher starts serving requests.
pub trait Registrar {
    /// Registers a command.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateCommand`] when the name or an alias is
    /// already taken in the instruction set.
    fn register_command(&mut self, descriptor: CommandDescriptor) -> Result<(), RegistryError>;

    /// Registers an event.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateEvent`] when the name is already taken
    /// in the instruction set.
    fn register_event(&mut self, descriptor: EventDescriptor) -> Result<(), RegistryError>;
}

/// A bundle of commands and events installed together.
pub trait CommandModule: Send + Sync {
    /// Module name used in logs.
    fn name(&self) -> &str;

    /// Registers every command and event the module provides.
    ///
    /// # Errors
    ///
    /// Propagates the first registration failure.
    fn register(&self, registrar: &mut dyn Registrar) -> Result<(), RegistryError>;
}
