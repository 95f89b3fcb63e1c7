//! Shared configuration for the OSMP daemon.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then a
//! configuration file, then `OSMP_*` environment variables, then CLI flags.
//! The resulting [`Config`] is handed to the dispatch core as a static value
//! at construction time; nothing in the core reloads it.

mod defaults;
mod logging;
mod security;
mod socket;

use std::ffi::OsString;

use ortho_config::{OrthoConfig, OrthoResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_SERVICE_PATH,
    DEFAULT_SUBSCRIBER_QUEUE, DEFAULT_TCP_PORT, default_command_timeout_ms,
    default_instruction_sets, default_listen_endpoint, default_log_filter,
    default_log_filter_string, default_log_format, default_service_path,
    default_subscriber_queue, default_transport_security,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use security::{TransportSecurity, TransportSecurityParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "OSMP")]
pub struct Config {
    /// Endpoint the transport adapter listens on.
    #[serde(default = "defaults::default_listen_endpoint")]
    pub listen: SocketEndpoint,
    /// Transport security mode.
    #[serde(default = "defaults::default_transport_security")]
    pub transport_security: TransportSecurity,
    /// Base resource path advertised to clients.
    #[serde(default = "defaults::default_service_path")]
    pub service_path: String,
    /// Instruction sets enabled at startup.
    #[serde(default = "defaults::default_instruction_sets")]
    pub instruction_sets: Vec<String>,
    /// Per-command timeout in milliseconds; zero disables the timeout.
    #[serde(default = "defaults::default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Capacity of each session's outbound queue.
    #[serde(default = "defaults::default_subscriber_queue")]
    pub subscriber_queue: usize,
    /// Tracing filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen_endpoint(),
            transport_security: default_transport_security(),
            service_path: default_service_path(),
            instruction_sets: default_instruction_sets(),
            command_timeout_ms: default_command_timeout_ms(),
            subscriber_queue: default_subscriber_queue(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads the configuration from the process arguments, `OSMP_*`
    /// environment variables and the configuration file.
    ///
    /// # Errors
    ///
    /// Returns the loader failure when a layer cannot be parsed or merged.
    pub fn load() -> OrthoResult<Self> {
        <Self as OrthoConfig>::load()
    }

    /// Loads the configuration using `args` in place of the process
    /// arguments. The first item is the program name.
    ///
    /// # Errors
    ///
    /// Returns the loader failure when a layer cannot be parsed or merged.
    pub fn load_from_iter<I, T>(args: I) -> OrthoResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Endpoint the transport adapter listens on.
    #[must_use]
    pub fn listen(&self) -> &SocketEndpoint {
        &self.listen
    }

    /// Transport security mode.
    #[must_use]
    pub fn transport_security(&self) -> TransportSecurity {
        self.transport_security
    }

    /// Base resource path advertised to clients.
    #[must_use]
    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// Instruction sets enabled at startup, in configuration order.
    #[must_use]
    pub fn instruction_sets(&self) -> &[String] {
        &self.instruction_sets
    }

    /// Per-command timeout; `None` when disabled.
    #[must_use]
    pub fn command_timeout(&self) -> Option<std::time::Duration> {
        (self.command_timeout_ms > 0)
            .then(|| std::time::Duration::from_millis(self.command_timeout_ms))
    }

    /// Capacity of each session's outbound queue.
    #[must_use]
    pub fn subscriber_queue(&self) -> usize {
        self.subscriber_queue
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Checks invariants the loader cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the service path is empty or relative, when
    /// the subscriber queue has no capacity, or when an instruction set name is
    /// blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.service_path.starts_with('/') {
            return Err(ConfigError::ServicePath {
                path: self.service_path.clone(),
            });
        }
        if self.subscriber_queue == 0 {
            return Err(ConfigError::SubscriberQueue);
        }
        if self
            .instruction_sets
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(ConfigError::BlankInstructionSet);
        }
        Ok(())
    }
}

/// Invariant violations detected by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The service path must be absolute.
    #[error("service path '{path}' must start with '/'")]
    ServicePath {
        /// Offending path.
        path: String,
    },
    /// The per-session queue must hold at least one message.
    #[error("subscriber queue capacity must be greater than zero")]
    SubscriberQueue,
    /// Instruction set names must not be blank.
    #[error("instruction set names must not be blank")]
    BlankInstructionSet,
}
