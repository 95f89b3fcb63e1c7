//! Decoded request, response and event model.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, ErrorPayload};

/// Request-supplied token used to match a response to its request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Argument values supplied with a command invocation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Arguments {
    /// Values keyed by parameter name.
    Named(Map<String, Value>),
    /// Values bound to parameters in declaration order.
    Positional(Vec<Value>),
}

impl Default for Arguments {
    fn default() -> Self {
        Self::Named(Map::new())
    }
}

impl Arguments {
    /// Builds named arguments from `(name, value)` pairs.
    #[must_use]
    pub fn named<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    /// Returns true when no value was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Named(values) => values.is_empty(),
            Self::Positional(values) => values.is_empty(),
        }
    }
}

/// A fully decoded command invocation handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Request {
    /// Instruction set that owns the command.
    pub instruction_set: String,
    /// Command name (or alias) within the instruction set.
    pub command: String,
    /// Argument values.
    #[serde(default)]
    pub arguments: Arguments,
    /// Token echoed back on the response.
    pub correlation_id: CorrelationId,
}

impl Request {
    /// Builds a request with named arguments.
    #[must_use]
    pub fn new(
        instruction_set: impl Into<String>,
        command: impl Into<String>,
        arguments: Arguments,
        correlation_id: impl Into<CorrelationId>,
    ) -> Self {
        Self {
            instruction_set: instruction_set.into(),
            command: command.into(),
            arguments,
            correlation_id: correlation_id.into(),
        }
    }
}

/// Result of a request: either a success value or a structured error.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Value returned by the command.
    Success(Value),
    /// Classified failure.
    Error(ErrorPayload),
}

impl Outcome {
    /// Returns the error kind for failed outcomes.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Error(payload) => Some(payload.kind),
        }
    }

    /// Returns true for successful outcomes.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Response to a single request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
    /// Token copied from the originating request.
    pub correlation_id: CorrelationId,
    /// What happened.
    pub outcome: Outcome,
}

impl Response {
    /// Builds a successful response.
    #[must_use]
    pub const fn success(correlation_id: CorrelationId, value: Value) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Success(value),
        }
    }

    /// Builds a failed response.
    #[must_use]
    pub const fn failure(correlation_id: CorrelationId, error: ErrorPayload) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Error(error),
        }
    }
}

/// Notification published on an event channel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Event {
    /// Instruction set that owns the event.
    pub instruction_set: String,
    /// Event name within the instruction set.
    pub name: String,
    /// Published value.
    pub payload: Value,
    /// Per-instruction-set sequence number, strictly increasing per publish.
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_response_matches_documented_shape() {
        let response = Response::success(CorrelationId(1), json!("hi"));
        assert_eq!(
            serde_json::to_value(&response).expect("serialize response"),
            json!({"correlation_id": 1, "outcome": {"success": "hi"}})
        );
    }

    #[test]
    fn failure_response_exposes_kind() {
        let response = Response::failure(
            CorrelationId(7),
            ErrorPayload::new(ErrorKind::CapabilityDenied, "instruction set 'custom' is not enabled"),
        );
        assert_eq!(
            response.outcome.error_kind(),
            Some(ErrorKind::CapabilityDenied)
        );
        let encoded = serde_json::to_value(&response).expect("serialize response");
        assert_eq!(encoded["outcome"]["error"]["kind"], json!("capability_denied"));
    }

    #[test]
    fn arguments_accept_objects_and_arrays() {
        let named: Arguments = serde_json::from_value(json!({"text": "hi"})).expect("named");
        assert!(matches!(named, Arguments::Named(ref map) if map.len() == 1));

        let positional: Arguments = serde_json::from_value(json!(["hi", 2])).expect("positional");
        assert!(matches!(positional, Arguments::Positional(ref values) if values.len() == 2));
    }

    #[test]
    fn missing_arguments_default_to_empty_named_set() {
        let request: Request = serde_json::from_value(json!({
            "instruction_set": "standard",
            "command": "help",
            "correlation_id": 3
        }))
        .expect("decode request");
        assert!(request.arguments.is_empty());
        assert_eq!(request.correlation_id, CorrelationId(3));
    }
}
