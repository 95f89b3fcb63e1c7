//! Test suites for the OSMP daemon.

mod lib_api;
mod session_behaviour;
pub(crate) mod support;
