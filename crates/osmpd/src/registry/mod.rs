//! Registries for instruction sets, commands and events.
//!
//! Command and event registries are populated through a [`Registrar`] while
//! the dispatcher is being built and are read-only afterwards. The instruction
//! set registry stays live so administrators can enable and disable
//! vocabularies at runtime.

mod commands;
mod errors;
mod events;
mod instruction_sets;
mod module;
mod schema;
#[cfg(test)]
mod tests;

pub use self::commands::{CommandDescriptor, CommandHandler, CommandRegistry};
pub use self::errors::RegistryError;
#[cfg(test)]
pub(crate) use self::events::MockEventSink;
pub use self::events::{
    Delivery, DeliveryStatus, EventDescriptor, EventRegistry, EventSink, SubscriberHandle,
    SubscriberId,
};
pub use self::instruction_sets::{InstructionSet, InstructionSetRegistry, InstructionSetSnapshot};
pub use self::module::{CommandModule, Registrar};
pub(crate) use self::schema::bind as bind_arguments;
pub use self::schema::{BoundArguments, ParamKind, ParamSpec, Schema, SchemaViolation};

pub(crate) const EVENTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::events");
