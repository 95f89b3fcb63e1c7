//! Structured logging for the daemon.
//!
//! The subscriber is installed once per process. Session, writer and request
//! threads carry their session number in the thread name, so both formats
//! record thread names instead of thread ids.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use osmp_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static ACTIVE: OnceCell<ActiveTelemetry> = OnceCell::new();

#[derive(Debug)]
struct ActiveTelemetry {
    filter: String,
    format: LogFormat,
}

/// Settings of the process-wide subscriber.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryHandle {
    active: &'static ActiveTelemetry,
}

impl TelemetryHandle {
    /// Filter expression the subscriber was installed with.
    #[must_use]
    pub fn filter(&self) -> &'static str {
        &self.active.filter
    }

    /// Output format the subscriber was installed with.
    #[must_use]
    pub fn format(&self) -> LogFormat {
        self.active.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression does not parse.
    #[error("invalid log filter '{expression}': {reason}")]
    Filter {
        /// Configured expression.
        expression: String,
        /// Parser message.
        reason: String,
    },
    /// Another subscriber was installed outside this module.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls return the handle of the subscriber already installed. When
/// they ask for a different filter or format a warning is logged and the
/// active settings are kept.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] when a foreign subscriber is already
/// registered.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let active = ACTIVE.get_or_try_init(|| install(config))?;
    if active.filter != config.log_filter() || active.format != config.log_format() {
        warn!(
            target: TELEMETRY_TARGET,
            active_filter = %active.filter,
            active_format = %active.format,
            requested_filter = config.log_filter(),
            requested_format = %config.log_format(),
            "logging already configured; keeping the active settings"
        );
    }
    Ok(TelemetryHandle { active })
}

fn install(config: &Config) -> Result<ActiveTelemetry, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    tracing::subscriber::set_global_default(subscriber(filter, config.log_format()))
        .map_err(TelemetryError::Subscriber)?;
    Ok(ActiveTelemetry {
        filter: config.log_filter().to_owned(),
        format: config.log_format(),
    })
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|error| TelemetryError::Filter {
        expression: expression.to_owned(),
        reason: error.to_string(),
    })
}

fn subscriber(filter: EnvFilter, format: LogFormat) -> Box<dyn Subscriber + Send + Sync> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_filters_name_the_expression() {
        let Err(error) = parse_filter("osmpd=[") else {
            panic!("filter must be rejected");
        };
        assert!(matches!(error, TelemetryError::Filter { .. }));
        assert!(error.to_string().contains("osmpd=["));
    }

    #[test]
    fn per_target_filters_parse() {
        assert!(parse_filter("warn,osmpd::dispatch=debug").is_ok());
    }

    #[test]
    fn later_initialisation_keeps_the_first_settings() {
        let first = initialise(&Config::default()).expect("initialise telemetry");
        let second = initialise(&Config {
            log_filter: "trace".to_owned(),
            log_format: LogFormat::Compact,
            ..Config::default()
        })
        .expect("initialise telemetry again");

        assert!(std::ptr::eq(first.active, second.active));
        assert_eq!(second.filter(), first.filter());
        assert_eq!(second.format(), first.format());
    }
}
