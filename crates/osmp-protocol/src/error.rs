//! Structured error classification carried by failed responses.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Classification of a failed request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ErrorKind {
    /// The request targets an instruction set the server has not enabled.
    CapabilityDenied,
    /// No command with the requested name exists in the instruction set.
    UnknownCommand,
    /// No event with the requested name exists in the instruction set.
    UnknownEvent,
    /// A command registration collided with an existing name.
    DuplicateCommand,
    /// An event registration collided with an existing name.
    DuplicateEvent,
    /// A required parameter was not supplied.
    MissingArgument,
    /// A parameter value does not match its declared type.
    InvalidArgument,
    /// A parameter was supplied that the command does not declare.
    UnexpectedArgument,
    /// The command reported a business failure.
    HandlerError,
    /// The command did not finish within its time budget.
    Timeout,
    /// The request was cancelled before its effects were committed.
    Cancelled,
    /// An unexpected fault occurred while dispatching or executing.
    InternalError,
}

impl ErrorKind {
    /// Returns true when a client may reasonably retry or correct the request.
    ///
    /// Schema violations, business failures, timeouts and cancellations are
    /// recoverable. Capability and registration failures require a different
    /// server configuration; internal errors indicate a server fault.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::MissingArgument
                | Self::InvalidArgument
                | Self::UnexpectedArgument
                | Self::HandlerError
                | Self::Timeout
                | Self::Cancelled
        )
    }
}

/// Error body of a failed [`crate::Response`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorPayload {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Caller-supplied detail attached by a failing command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorPayload {
    /// Builds a payload without attached data.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured detail to the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.kind, self.message)
    }
}
