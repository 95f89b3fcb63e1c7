//! BDD test world for the bootstrap sequence: loader, reporter, and the
//! resulting daemon or error.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, bootstrap_with};
use crate::registry::{CommandDescriptor, CommandModule, Registrar, RegistryError};
use crate::transport::ListenerHandle;

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::reporter::RecordingHealthReporter;
use super::sinks::handler;

/// Module that claims the standard `echo` command a second time.
struct ConflictingModule;

impl CommandModule for ConflictingModule {
    fn name(&self) -> &str {
        "conflicting"
    }

    fn register(&self, registrar: &mut dyn Registrar) -> Result<(), RegistryError> {
        registrar.register_command(CommandDescriptor::new(
            "standard",
            "echo",
            handler(|_| Ok(serde_json::Value::Null)),
        ))
    }
}

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    conflicting: bool,
    pub reporter: Arc<RecordingHealthReporter>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    listener: Option<ListenerHandle>,
}

impl TestWorld {
    /// Builds a world with a successful configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            conflicting: false,
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemon: None,
            bootstrap_error: None,
            listener: None,
        }
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
        self.reset_results();
    }

    /// Installs a loader that succeeds.
    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader::new());
        self.reset_results();
    }

    /// Installs a loader that requests in-process TLS.
    pub fn use_tls_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader::new().with_tls());
        self.reset_results();
    }

    /// Installs a loader enabling exactly `names`.
    pub fn use_instruction_sets(&mut self, names: &[&str]) {
        self.loader = Box::new(TestConfigLoader::new().with_instruction_sets(names));
        self.reset_results();
    }

    /// Adds a module whose command clashes with the standard set.
    pub fn add_conflicting_module(&mut self) {
        self.conflicting = true;
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.daemon.is_some() || self.bootstrap_error.is_some() {
            return;
        }

        let conflicting = ConflictingModule;
        let modules: Vec<&dyn CommandModule> = if self.conflicting {
            vec![&conflicting]
        } else {
            Vec::new()
        };
        match bootstrap_with(&*self.loader, self.reporter.clone(), &modules) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Starts the listener of a bootstrapped daemon.
    pub fn start_listener(&mut self) {
        let daemon = self.daemon.as_ref().expect("daemon should be bootstrapped");
        self.listener = Some(daemon.start_listener().expect("listener should start"));
    }

    /// Returns whether bootstrap produced an error.
    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Returns the daemon handle when bootstrap succeeded.
    #[must_use]
    pub fn daemon(&self) -> Option<&Daemon> {
        self.daemon.as_ref()
    }

    fn reset_results(&mut self) {
        self.daemon = None;
        self.bootstrap_error = None;
        self.listener = None;
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            drop(listener.stop(Duration::from_secs(2)));
        }
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
