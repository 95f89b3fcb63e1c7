//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::OrthoError;
use tempfile::TempDir;
use osmp_config::{Config, SocketEndpoint, TransportSecurity};

use crate::bootstrap::ConfigLoader;

/// Loader that provisions a Unix socket path under a temporary directory.
pub struct TestConfigLoader {
    socket_dir: TempDir,
    transport_security: TransportSecurity,
    instruction_sets: Option<Vec<String>>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            socket_dir: TempDir::new().expect("failed to create temporary directory for socket"),
            transport_security: TransportSecurity::Plain,
            instruction_sets: None,
        }
    }

    /// Requests TLS termination from the daemon.
    #[must_use]
    pub fn with_tls(mut self) -> Self {
        self.transport_security = TransportSecurity::Tls;
        self
    }

    /// Overrides the instruction sets enabled at startup.
    #[must_use]
    pub fn with_instruction_sets(mut self, names: &[&str]) -> Self {
        self.instruction_sets = Some(names.iter().map(|name| (*name).to_owned()).collect());
        self
    }

    fn socket_path(&self) -> String {
        self.socket_dir
            .path()
            .join("run")
            .join("osmpd.sock")
            .to_str()
            .expect("temporary socket path was not valid UTF-8")
            .to_owned()
    }
}

impl Default for TestConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let defaults = Config::default();
        Ok(Config {
            listen: SocketEndpoint::unix(self.socket_path()),
            transport_security: self.transport_security,
            instruction_sets: self
                .instruction_sets
                .clone()
                .unwrap_or(defaults.instruction_sets.clone()),
            ..defaults
        })
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("osmpd"),
            OsString::from("--listen"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
