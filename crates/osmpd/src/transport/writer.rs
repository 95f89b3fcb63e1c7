//! JSONL serialization of server messages.

use std::io::Write;

use osmp_protocol::ServerMessage;

use super::SessionError;

/// Writer that frames server messages as JSONL.
pub(crate) struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub(crate) const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one message as a JSONL line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub(crate) fn write_message(&mut self, message: &ServerMessage) -> Result<(), SessionError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
