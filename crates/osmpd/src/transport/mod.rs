//! Socket transport for the OSMP daemon.
//!
//! The transport binds the configured endpoint, accepts connections on a
//! background thread and serves each one as a JSONL session backed by the
//! dispatcher. Open sessions are tracked so an orderly stop can close them.

mod connections;
mod errors;
mod handler;
mod lines;
mod listener;
mod session;
mod writer;

pub use self::errors::{ListenerError, SessionError};
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream};
pub use self::listener::ListenerHandle;
pub(crate) use self::listener::SocketListener;
pub(crate) use self::session::SessionHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
