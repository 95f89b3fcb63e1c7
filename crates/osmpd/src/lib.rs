//! The OSMP dispatch and capability daemon.
//!
//! Clients open a session over a JSONL socket and invoke named commands that
//! live inside instruction sets. Every request passes through the same steps:
//! the instruction set must be enabled, the command must be registered, the
//! arguments must satisfy the command's schema, and only then does the handler
//! run. Handlers stage writes to the shared [`GlobalEnvironment`] and queue
//! events; the dispatcher commits both only when the handler succeeds, so a
//! failed, cancelled, or timed-out command leaves no trace.
//!
//! Events published on an instruction set carry a per-set sequence number and
//! fan out to every subscriber registered at publish time. The `standard`
//! instruction set ([`StandardModule`]) provides introspection commands,
//! subscription management, and the periodic heartbeat event.
//!
//! Bootstrap loads configuration through `ortho_config`, installs structured
//! telemetry, and reports lifecycle milestones to a [`HealthReporter`].

mod bootstrap;
mod cancellation;
pub mod dispatch;
pub mod environment;
mod health;
mod process;
pub mod registry;
pub mod standard;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use cancellation::CancellationToken;
pub use dispatch::{
    Caller, CommandContext, DispatchError, Dispatcher, DispatcherBuilder, DispatcherSettings,
    HandlerFailure,
};
pub use environment::{EnvTransaction, GlobalEnvironment};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownCause, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon,
};
pub use registry::{CommandDescriptor, CommandModule, ParamKind, ParamSpec, Registrar, Schema};
pub use standard::{HEARTBEAT_EVENT, StandardModule};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ListenerError, ListenerHandle, SessionError};

#[cfg(test)]
mod tests;
