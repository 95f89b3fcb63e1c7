//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};

use super::errors::LaunchError;
use super::heartbeat::Heartbeat;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{HEARTBEAT_INTERVAL, PROCESS_TARGET, SESSION_DRAIN_TIMEOUT};

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
}

/// Runs the daemon using the production collaborators.
///
/// Blocks until a termination signal arrives, then closes every open
/// session before returning.
///
/// # Errors
///
/// Returns a [`LaunchError`] when signal installation, bootstrap or the
/// listener fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::install()?,
    })
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
    } = plan;

    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let daemon = bootstrap_with(&loader, Arc::clone(&reporter), &[])?;
    let listener = daemon.start_listener()?;
    let heartbeat = Heartbeat::start(daemon.dispatcher().clone(), HEARTBEAT_INTERVAL);

    let waited = shutdown.wait();
    match &waited {
        Ok(cause) => info!(target: PROCESS_TARGET, %cause, "shutting down"),
        Err(error) => warn!(target: PROCESS_TARGET, %error, "shutting down"),
    }
    reporter.shutdown_requested();
    heartbeat.stop();
    let lingering = listener.stop(SESSION_DRAIN_TIMEOUT)?;
    if lingering > 0 {
        warn!(
            target: PROCESS_TARGET,
            lingering,
            grace_ms = SESSION_DRAIN_TIMEOUT.as_millis(),
            "sessions still open after the grace period"
        );
    }
    waited?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
