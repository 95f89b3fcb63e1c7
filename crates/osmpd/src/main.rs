//! Entry point of the OSMP daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match osmpd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = io::stderr().lock();
            // Telemetry may not be installed yet, so report directly.
            drop(writeln!(stderr, "osmpd: {error}"));
            ExitCode::FAILURE
        }
    }
}
