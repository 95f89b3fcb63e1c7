//! Wire vocabulary for the Open System Management Protocol.
//!
//! The types in this crate are shared by the `osmpd` server and by clients.
//! They come in two layers:
//!
//! - The decoded model ([`Request`], [`Response`], [`Event`]) consumed and
//!   produced by the dispatch core. It is independent of any framing.
//! - The JSONL framing envelopes ([`ClientMessage`], [`ServerMessage`]) used by
//!   the socket transport. One envelope is serialized per line.
//!
//! Every failure is classified by an [`ErrorKind`] so client tooling can branch
//! on recoverable and fatal conditions without parsing messages.

mod error;
mod frame;
mod message;

pub use error::{ErrorKind, ErrorPayload};
pub use frame::{
    ClientMessage, CommandFrame, EventFrame, Greeting, ResponseFrame, ResponseStatus,
    ServerMessage,
};
pub use message::{Arguments, CorrelationId, Event, Outcome, Request, Response};

/// Human-readable protocol name advertised in the session greeting.
pub const PROTOCOL_NAME: &str = "Open System Management Protocol";

/// Protocol revision implemented by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Instruction set that every server ships and enables by default.
pub const STANDARD_INSTRUCTION_SET: &str = "standard";
