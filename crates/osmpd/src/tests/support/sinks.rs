//! Event sinks and request helpers shared by unit and behaviour tests.

use std::sync::{Arc, Mutex};

use osmp_protocol::{Arguments, CorrelationId, Event, Outcome, Request};
use serde_json::Value;

use crate::dispatch::{Caller, CommandContext, Dispatcher, HandlerFailure, SessionId};
use crate::registry::{DeliveryStatus, EventSink, SubscriberHandle};

/// Sink that records every event it accepts.
///
/// A bounded sink reports [`DeliveryStatus::Dropped`] once full.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    capacity: Option<usize>,
}

impl RecordingSink {
    /// Unbounded sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sink that accepts at most `capacity` events.
    pub fn bounded(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            capacity: Some(capacity),
        })
    }

    /// Copy of the recorded events.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }

    /// Sequence numbers of the recorded events.
    pub fn sequences(&self) -> Vec<u64> {
        self.events().iter().map(|event| event.sequence).collect()
    }
}

impl EventSink for RecordingSink {
    fn deliver(&self, event: &Event) -> DeliveryStatus {
        let mut events = self.events.lock().expect("sink mutex poisoned");
        if self.capacity.is_some_and(|capacity| events.len() >= capacity) {
            return DeliveryStatus::Dropped;
        }
        events.push(event.clone());
        DeliveryStatus::Delivered
    }
}

/// Handle referring to `sink`.
pub fn handle_for(sink: &Arc<RecordingSink>) -> SubscriberHandle {
    let sink: Arc<dyn EventSink> = Arc::clone(sink) as Arc<dyn EventSink>;
    SubscriberHandle::new(&sink)
}

/// A fresh client session receiving events through `sink`.
pub fn session_for(sink: &Arc<RecordingSink>) -> Caller {
    Caller::session(SessionId::next(), Some(handle_for(sink)))
}

/// Gives a closure the handler signature expected by the registry.
pub fn handler<F>(body: F) -> F
where
    F: Fn(&mut CommandContext) -> Result<Value, HandlerFailure> + Send + Sync + 'static,
{
    body
}

/// Builds a request from a JSON argument value.
pub fn request(instruction_set: &str, command: &str, arguments: Value, nr: u64) -> Request {
    let arguments = if arguments.is_null() {
        Arguments::default()
    } else {
        serde_json::from_value(arguments).expect("arguments must be an object or array")
    };
    Request::new(instruction_set, command, arguments, CorrelationId(nr))
}

/// Dispatches a request as `caller` and returns its outcome.
pub fn call(
    dispatcher: &Dispatcher,
    caller: &Caller,
    instruction_set: &str,
    command: &str,
    arguments: Value,
) -> Outcome {
    let response = dispatcher.handle_as(caller, request(instruction_set, command, arguments, 1));
    assert_eq!(response.correlation_id, CorrelationId(1));
    response.outcome
}

/// Unwraps a successful outcome.
pub fn success(outcome: Outcome) -> Value {
    match outcome {
        Outcome::Success(value) => value,
        Outcome::Error(payload) => panic!("expected success, got {payload}"),
    }
}
