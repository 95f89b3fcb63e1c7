//! Process lifecycle of the daemon binary.

use std::time::Duration;

mod errors;
mod heartbeat;
mod launch;
mod shutdown;

pub use errors::LaunchError;
pub use launch::run_daemon;
pub use shutdown::{ShutdownCause, ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
