//! Request dispatch for the OSMP daemon.
//!
//! The [`Dispatcher`] is the single entry point for decoded requests. For
//! each request it:
//!
//! 1. checks that the instruction set is enabled (`capability_denied`);
//! 2. resolves the command or alias (`unknown_command`);
//! 3. binds the arguments against the command schema;
//! 4. runs the handler with a [`CommandContext`] holding an environment
//!    transaction, isolated from panics and bounded by the configured
//!    timeout;
//! 5. commits the staged environment writes, subscription changes and event
//!    publications when the handler succeeds, or discards them otherwise.
//!
//! Every outcome is turned into a [`osmp_protocol::Response`] carrying the
//! request's correlation identifier.

mod active;
mod context;
mod dispatcher;
mod errors;
mod execution;

pub use self::active::{ActiveCommand, ActiveCommands};
pub use self::context::{Caller, CommandContext, Invocation, SessionId};
pub use self::dispatcher::{Dispatcher, DispatcherBuilder, DispatcherSettings, Resolution};
pub use self::errors::{DispatchError, HandlerFailure};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
