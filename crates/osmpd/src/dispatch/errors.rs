//! Error types for request dispatch failures.
//!
//! Every failure is resolved into a structured response: each
//! [`DispatchError`] variant maps to exactly one protocol [`ErrorKind`].

use std::time::Duration;

use osmp_protocol::{ErrorKind, ErrorPayload};
use serde_json::Value;
use thiserror::Error;

use crate::environment::EnvironmentError;
use crate::registry::{RegistryError, SchemaViolation};

/// Failure reported by a command handler.
///
/// Defaults to [`ErrorKind::HandlerError`]; handlers validating their own
/// arguments may report a schema kind instead.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct HandlerFailure {
    kind: ErrorKind,
    message: String,
    data: Option<Value>,
}

impl HandlerFailure {
    /// Creates a business failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::HandlerError, message)
    }

    /// Creates a failure of an explicit kind.
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    /// Creates an invalid argument failure.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::InvalidArgument, message)
    }

    /// Attaches a caller-visible payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Protocol error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Caller-visible payload.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

impl From<EnvironmentError> for HandlerFailure {
    fn from(error: EnvironmentError) -> Self {
        Self::with_kind(ErrorKind::InternalError, error.to_string())
    }
}

impl From<DispatchError> for HandlerFailure {
    fn from(error: DispatchError) -> Self {
        Self::with_kind(error.kind(), error.to_string())
    }
}

/// Errors surfaced while dispatching a request or publishing an event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The instruction set is not enabled.
    #[error("instruction set '{instruction_set}' is not enabled")]
    CapabilityDenied {
        /// Requested instruction set.
        instruction_set: String,
    },
    /// Lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Arguments did not match the schema.
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    /// The handler reported a failure.
    #[error("{0}")]
    Handler(HandlerFailure),
    /// The handler exceeded the configured timeout.
    #[error("command '{command}' timed out after {}ms", after.as_millis())]
    Timeout {
        /// Command name.
        command: String,
        /// Configured budget.
        after: Duration,
    },
    /// The invocation was cancelled before commit.
    #[error("command '{command}' was cancelled")]
    Cancelled {
        /// Command name.
        command: String,
    },
    /// The handler panicked.
    #[error("command '{command}' failed unexpectedly: {message}")]
    Panicked {
        /// Command name.
        command: String,
        /// Panic payload, when printable.
        message: String,
    },
    /// Committing the environment failed.
    #[error("environment commit failed: {0}")]
    Environment(#[source] EnvironmentError),
}

impl DispatchError {
    /// Creates a capability denied error.
    pub fn capability_denied(instruction_set: impl Into<String>) -> Self {
        Self::CapabilityDenied {
            instruction_set: instruction_set.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(command: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            command: command.into(),
            after,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(command: impl Into<String>) -> Self {
        Self::Cancelled {
            command: command.into(),
        }
    }

    /// Creates a panic error.
    pub fn panicked(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Panicked {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Converts a commit failure for `command`.
    ///
    /// A cancellation observed under the commit lock is reported as
    /// [`ErrorKind::Cancelled`]; every other commit failure is internal.
    pub fn from_commit(command: impl Into<String>, error: EnvironmentError) -> Self {
        match error {
            EnvironmentError::Cancelled => Self::cancelled(command),
            other => Self::Environment(other),
        }
    }

    /// Protocol error kind reported to clients.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CapabilityDenied { .. } => ErrorKind::CapabilityDenied,
            Self::Registry(error) => error.kind(),
            Self::Schema(violation) => violation.kind(),
            Self::Handler(failure) => failure.kind(),
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Panicked { .. } | Self::Environment(_) => ErrorKind::InternalError,
        }
    }

    /// Structured payload carried by the failure response.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        let payload = ErrorPayload::new(self.kind(), self.to_string());
        match self {
            Self::Handler(failure) => match failure.data() {
                Some(data) => payload.with_data(data.clone()),
                None => payload,
            },
            _ => payload,
        }
    }
}
