//! Shared doubles and helpers for the daemon's unit and behaviour suites.

mod config_loader;
mod reporter;
mod sinks;
mod world;

pub use config_loader::TestConfigLoader;
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use sinks::{RecordingSink, call, handle_for, handler, request, session_for, success};
pub use world::{TestWorld, world};
