//! Bounded JSONL line reading.

use std::io::{self, BufRead, BufReader, Read};

/// Longest accepted request line, newline excluded.
pub(crate) const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One line read from a session.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Line {
    /// A line within the size limit, without its terminator.
    Complete(Vec<u8>),
    /// A line that exceeded the limit; its content was discarded.
    Oversize,
}

/// Reads newline-delimited frames without buffering more than the limit.
pub(crate) struct LineReader<R> {
    inner: BufReader<R>,
    limit: usize,
}

impl<R: Read> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self::with_limit(inner, MAX_LINE_BYTES)
    }

    pub(crate) fn with_limit(inner: R, limit: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            limit,
        }
    }

    /// Reads the next line. Returns `None` at end of stream.
    ///
    /// A final line without a terminator is still returned. Oversize lines
    /// are skipped up to and including their terminator.
    pub(crate) fn next_line(&mut self) -> io::Result<Option<Line>> {
        let mut line = Vec::new();
        let mut oversize = false;
        loop {
            let (consumed, terminated) = {
                let available = match self.inner.fill_buf() {
                    Ok(available) => available,
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                    Err(error) => return Err(error),
                };
                if available.is_empty() {
                    return Ok(match (oversize, line.is_empty()) {
                        (true, _) => Some(Line::Oversize),
                        (false, true) => None,
                        (false, false) => Some(Line::Complete(strip_carriage_return(line))),
                    });
                }
                let newline = available.iter().position(|byte| *byte == b'\n');
                let content = newline.map_or(available, |pos| available.split_at(pos).0);
                if !oversize {
                    if line.len() + content.len() > self.limit {
                        oversize = true;
                        line = Vec::new();
                    } else {
                        line.extend_from_slice(content);
                    }
                }
                match newline {
                    Some(pos) => (pos + 1, true),
                    None => (available.len(), false),
                }
            };
            self.inner.consume(consumed);
            if terminated {
                return Ok(Some(if oversize {
                    Line::Oversize
                } else {
                    Line::Complete(strip_carriage_return(line))
                }));
            }
        }
    }
}

fn strip_carriage_return(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[u8], limit: usize) -> Vec<Line> {
        let mut reader = LineReader::with_limit(input, limit);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().expect("read line") {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn splits_on_newlines_and_keeps_a_trailing_fragment() {
        assert_eq!(
            lines(b"one\r\ntwo\nthree", 16),
            [
                Line::Complete(b"one".to_vec()),
                Line::Complete(b"two".to_vec()),
                Line::Complete(b"three".to_vec()),
            ]
        );
    }

    #[test]
    fn oversize_lines_are_skipped_without_losing_the_next_one() {
        assert_eq!(
            lines(b"0123456789\nok\n", 4),
            [Line::Oversize, Line::Complete(b"ok".to_vec())]
        );
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(lines(b"", 4).is_empty());
    }

    #[test]
    fn lines_exactly_at_the_limit_are_kept() {
        assert_eq!(
            lines(b"abcd
efghi
", 4),
            [Line::Complete(b"abcd".to_vec()), Line::Oversize]
        );
    }
}
