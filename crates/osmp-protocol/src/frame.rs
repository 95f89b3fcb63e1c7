//! JSONL framing envelopes exchanged over a session.
//!
//! Clients send [`ClientMessage`] lines and the server replies with
//! [`ServerMessage`] lines. Field names follow the protocol's kebab-case
//! convention (`instruction-set`, `cmd-nr`).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ErrorPayload;
use crate::message::{Arguments, CorrelationId, Event, Outcome, Request, Response};
use crate::{PROTOCOL_NAME, PROTOCOL_VERSION, STANDARD_INSTRUCTION_SET};

/// Event identifier of the greeting sent when a session opens.
const GREETING_EVENT: &str = "session-initiated";

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Invoke a command.
    Cmd(CommandFrame),
    /// Cancel an in-flight command started on the same session.
    Cancel {
        /// Correlation number of the command to cancel.
        nr: CorrelationId,
    },
}

/// Command invocation envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommandFrame {
    /// Instruction set owning the command; `standard` when omitted.
    #[serde(rename = "instruction-set", default = "standard_instruction_set")]
    pub instruction_set: String,
    /// Command name or alias.
    pub id: String,
    /// Correlation number chosen by the client.
    pub nr: CorrelationId,
    /// Named or positional arguments.
    #[serde(default)]
    pub data: Option<Arguments>,
}

impl CommandFrame {
    /// Converts the envelope into a decoded request.
    #[must_use]
    pub fn into_request(self) -> Request {
        Request {
            instruction_set: self.instruction_set,
            command: self.id,
            arguments: self.data.unwrap_or_default(),
            correlation_id: self.nr,
        }
    }
}

fn standard_instruction_set() -> String {
    STANDARD_INSTRUCTION_SET.to_owned()
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Terminal answer to a command.
    Response(ResponseFrame),
    /// Event delivery or session greeting.
    Event(EventFrame),
    /// Protocol-level failure not attributable to a command.
    Error {
        /// Description of the failure.
        description: String,
    },
}

impl ServerMessage {
    /// Frames a dispatcher response for the named command.
    #[must_use]
    pub fn response(command: impl Into<String>, response: Response) -> Self {
        Self::Response(ResponseFrame::new(command, response))
    }

    /// Frames an event delivery.
    #[must_use]
    pub fn event(event: Event) -> Self {
        Self::Event(EventFrame::from(event))
    }

    /// Frames a protocol error.
    #[must_use]
    pub fn error(description: impl Into<String>) -> Self {
        Self::Error {
            description: description.into(),
        }
    }

    /// Frames the session greeting.
    #[must_use]
    pub fn greeting(greeting: &Greeting) -> Self {
        Self::Event(EventFrame {
            instruction_set: None,
            id: GREETING_EVENT.to_owned(),
            nr: 0,
            data: greeting.to_value(),
        })
    }
}

/// Status marker of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ResponseStatus {
    /// The command succeeded.
    #[serde(rename = "OK")]
    Ok,
    /// The command failed; see the `error` field.
    #[serde(rename = "ERROR")]
    Error,
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResponseFrame {
    /// Command name as requested.
    pub id: String,
    /// Correlation number copied from the request.
    #[serde(rename = "cmd-nr")]
    pub cmd_nr: CorrelationId,
    /// Success marker.
    pub status: ResponseStatus,
    /// Success value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ResponseFrame {
    /// Builds an envelope from a dispatcher response.
    #[must_use]
    pub fn new(command: impl Into<String>, response: Response) -> Self {
        let (status, data, error) = match response.outcome {
            Outcome::Success(value) => (ResponseStatus::Ok, Some(value), None),
            Outcome::Error(payload) => (ResponseStatus::Error, None, Some(payload)),
        };
        Self {
            id: command.into(),
            cmd_nr: response.correlation_id,
            status,
            data,
            error,
        }
    }

    /// Recovers the decoded response from the envelope.
    ///
    /// A failed envelope without error detail is reported with the
    /// `internal_error` kind.
    #[must_use]
    pub fn into_response(self) -> Response {
        let outcome = match (self.status, self.error) {
            (ResponseStatus::Ok, _) => Outcome::Success(self.data.unwrap_or(Value::Null)),
            (ResponseStatus::Error, Some(payload)) => Outcome::Error(payload),
            (ResponseStatus::Error, None) => Outcome::Error(ErrorPayload::new(
                crate::ErrorKind::InternalError,
                "response carried no error detail",
            )),
        };
        Response {
            correlation_id: self.cmd_nr,
            outcome,
        }
    }
}

/// Event envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventFrame {
    /// Instruction set owning the event; absent on the greeting.
    #[serde(
        rename = "instruction-set",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub instruction_set: Option<String>,
    /// Event name.
    pub id: String,
    /// Sequence number.
    pub nr: u64,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl From<Event> for EventFrame {
    fn from(event: Event) -> Self {
        Self {
            instruction_set: Some(event.instruction_set),
            id: event.name,
            nr: event.sequence,
            data: event.payload,
        }
    }
}

impl EventFrame {
    /// Returns true when this frame is the session greeting.
    #[must_use]
    pub fn is_greeting(&self) -> bool {
        self.instruction_set.is_none() && self.id == GREETING_EVENT
    }
}

/// Capability advertisement sent when a session opens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Greeting {
    /// Protocol name.
    pub protocol: String,
    /// Protocol revision.
    pub version: u32,
    /// Base resource path of the service.
    pub service: String,
    /// Enabled instruction sets in the order they were enabled.
    #[serde(rename = "instruction-sets")]
    pub instruction_sets: Vec<String>,
}

impl Greeting {
    /// Builds a greeting for the current protocol revision.
    #[must_use]
    pub fn new(service: impl Into<String>, instruction_sets: Vec<String>) -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_owned(),
            version: PROTOCOL_VERSION,
            service: service.into(),
            instruction_sets,
        }
    }

    /// Parses the greeting carried by an event frame.
    #[must_use]
    pub fn from_frame(frame: &EventFrame) -> Option<Self> {
        if !frame.is_greeting() {
            return None;
        }
        serde_json::from_value(frame.data.clone()).ok()
    }

    fn to_value(&self) -> Value {
        json!({
            "protocol": self.protocol,
            "version": self.version,
            "service": self.service,
            "instruction-sets": self.instruction_sets,
        })
    }
}
