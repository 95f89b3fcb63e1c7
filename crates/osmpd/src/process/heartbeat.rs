//! Periodic publication of the `standard/heartbeat` event.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use osmp_protocol::STANDARD_INSTRUCTION_SET;
use serde_json::json;
use tracing::{debug, warn};

use crate::dispatch::{DispatchError, Dispatcher};
use crate::standard::HEARTBEAT_EVENT;

use super::PROCESS_TARGET;

/// Background publisher of liveness events.
pub(crate) struct Heartbeat {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Publishes a heartbeat every `interval` until stopped.
    pub(crate) fn start(dispatcher: Dispatcher, interval: Duration) -> Self {
        let (stop, stopped) = mpsc::channel();
        let started = Instant::now();
        let thread = thread::Builder::new()
            .name("osmp-heartbeat".to_owned())
            .spawn(move || {
                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                    beat(&dispatcher, started.elapsed());
                }
            })
            .map_err(|error| {
                warn!(target: PROCESS_TARGET, %error, "failed to start heartbeat");
            })
            .ok();
        Self { stop, thread }
    }

    /// Stops publishing and waits for the publisher to exit.
    pub(crate) fn stop(mut self) {
        if self.stop.send(()).is_err() {
            debug!(target: PROCESS_TARGET, "heartbeat publisher already stopped");
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(target: PROCESS_TARGET, "heartbeat thread panicked");
        }
    }
}

fn beat(dispatcher: &Dispatcher, uptime: Duration) {
    let payload = json!({ "uptime": uptime.as_secs() });
    match dispatcher.publish(STANDARD_INSTRUCTION_SET, HEARTBEAT_EVENT, payload) {
        Ok(deliveries) => debug!(
            target: PROCESS_TARGET,
            subscribers = deliveries.len(),
            "heartbeat published"
        ),
        Err(DispatchError::CapabilityDenied { .. }) => {}
        Err(error) => warn!(target: PROCESS_TARGET, %error, "heartbeat failed"),
    }
}
