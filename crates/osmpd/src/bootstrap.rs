//! Daemon bootstrap orchestration.

use std::fmt;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use osmp_config::{Config, ConfigError, SocketPreparationError, TransportSecurity};

use crate::dispatch::{Dispatcher, DispatcherSettings};
use crate::health::HealthReporter;
use crate::registry::{CommandModule, RegistryError};
use crate::standard::StandardModule;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{
    ConnectionHandler, ListenerError, ListenerHandle, SessionHandler, SocketListener,
};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader failure when no configuration can be assembled.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that returns a configuration resolved earlier.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already loaded configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but violates an invariant.
    #[error("invalid configuration: {source}")]
    InvalidConfiguration {
        /// Violated invariant.
        #[source]
        source: ConfigError,
    },
    /// The requested transport security cannot be provided in-process.
    #[error("transport security '{mode}' must be terminated in front of the daemon")]
    UnsupportedSecurity {
        /// Requested mode.
        mode: TransportSecurity,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// A command module could not be installed.
    #[error("failed to register commands: {source}")]
    Registration {
        /// Conflicting or invalid registration.
        #[source]
        source: RegistryError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    dispatcher: Dispatcher,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The dispatcher serving this daemon's sessions.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Binds the configured endpoint and starts accepting sessions.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the endpoint cannot be bound.
    pub fn start_listener(&self) -> Result<ListenerHandle, ListenerError> {
        let listener = SocketListener::bind(self.config.listen())?;
        let handler: Arc<dyn ConnectionHandler> = Arc::new(SessionHandler::new(
            self.dispatcher.clone(),
            self.config.service_path(),
            self.config.subscriber_queue(),
        ));
        let handle = listener.start(handler)?;
        self.reporter
            .listener_ready(self.config.listen(), handle.local_addr());
        Ok(handle)
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// The standard instruction set is always installed; `modules` are installed
/// after it in order.
///
/// # Errors
///
/// Returns a [`BootstrapError`] describing the first failing step. The
/// reporter is notified before the error is returned.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    modules: &[&dyn CommandModule],
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match assemble(loader, modules) {
        Ok((config, dispatcher, telemetry)) => {
            reporter.bootstrap_succeeded(&config);
            Ok(Daemon {
                config,
                dispatcher,
                telemetry,
                reporter,
            })
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn assemble(
    loader: &dyn ConfigLoader,
    modules: &[&dyn CommandModule],
) -> Result<(Config, Dispatcher, TelemetryHandle), BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| BootstrapError::InvalidConfiguration { source })?;
    if config.transport_security().requires_tls() {
        return Err(BootstrapError::UnsupportedSecurity {
            mode: config.transport_security(),
        });
    }

    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .listen()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;

    let mut builder = Dispatcher::builder(DispatcherSettings::from_config(&config));
    let registration = |source| BootstrapError::Registration { source };
    builder.install(&StandardModule).map_err(registration)?;
    for module in modules {
        builder.install(*module).map_err(registration)?;
    }
    Ok((config, builder.build(), telemetry))
}
