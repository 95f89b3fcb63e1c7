//! The `wait` command.

use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::dispatch::{CommandContext, HandlerFailure};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Sleeps for `seconds`, or until cancelled when no duration is given.
///
/// Cancellation is polled, so a cancel frame or the command timeout ends the
/// wait within one poll interval.
pub(super) fn wait(context: &mut CommandContext) -> Result<Value, HandlerFailure> {
    let deadline = match context.arguments().f64("seconds") {
        None => None,
        Some(seconds) if seconds >= 0.0 => {
            let length = Duration::try_from_secs_f64(seconds)
                .map_err(|error| HandlerFailure::invalid_argument(format!("seconds: {error}")))?;
            Instant::now().checked_add(length)
        }
        Some(_) => {
            return Err(HandlerFailure::invalid_argument(
                "seconds must not be negative",
            ));
        }
    };

    let started = Instant::now();
    loop {
        if context.is_cancelled() {
            return Err(HandlerFailure::new("wait cancelled"));
        }
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => POLL_INTERVAL,
        };
        if remaining.is_zero() {
            break;
        }
        thread::sleep(remaining.min(POLL_INTERVAL));
    }
    Ok(json!({ "waited": started.elapsed().as_secs_f64() }))
}
