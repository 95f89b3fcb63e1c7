//! Waiting for the process to be asked to stop.

use std::fmt;
use std::io;
use std::sync::{Mutex, PoisonError};

use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use signal_hook::low_level::signal_name;
use thiserror::Error;

/// Why the daemon is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A termination signal arrived.
    Signal(i32),
    /// The embedding code asked for shutdown.
    Requested,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => match signal_name(*signal) {
                Some(name) => f.write_str(name),
                None => write!(f, "signal {signal}"),
            },
            Self::Requested => f.write_str("requested"),
        }
    }
}

/// Source of the shutdown notification.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    ///
    /// # Errors
    ///
    /// Returns a [`ShutdownError`] when no notification can arrive any more.
    fn wait(&self) -> Result<ShutdownCause, ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal iterator closed without delivering a signal.
    #[error("signal delivery stopped before a termination signal arrived")]
    Closed,
}

/// Waits for `SIGTERM`, `SIGINT` or `SIGQUIT`.
///
/// Handlers are registered on construction so a signal arriving while the
/// daemon is still bootstrapping is not lost.
#[derive(Debug)]
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
}

impl SystemShutdownSignal {
    /// Registers the termination signal handlers.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] when registration fails.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT])
            .map_err(|source| ShutdownError::Install { source })?;
        Ok(Self {
            signals: Mutex::new(signals),
        })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<ShutdownCause, ShutdownError> {
        let mut signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        signals
            .forever()
            .next()
            .map(ShutdownCause::Signal)
            .ok_or(ShutdownError::Closed)
    }
}
