//! Bookkeeping for in-flight command invocations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use osmp_protocol::CorrelationId;
use serde::Serialize;

use crate::cancellation::CancellationToken;

use super::context::{Invocation, SessionId};

/// Snapshot of one in-flight invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveCommand {
    /// Dispatcher-assigned invocation number.
    pub invocation: u64,
    /// Instruction set of the command.
    #[serde(rename = "instruction-set")]
    pub instruction_set: String,
    /// Canonical command name.
    pub command: String,
    /// Session that started the invocation.
    pub session: SessionId,
    /// Correlation number supplied by the caller.
    #[serde(rename = "cmd-nr")]
    pub correlation_id: CorrelationId,
    /// Time spent so far.
    #[serde(rename = "elapsed-ms")]
    pub elapsed_ms: u64,
}

#[derive(Debug)]
struct Entry {
    instruction_set: String,
    command: String,
    session: SessionId,
    correlation_id: CorrelationId,
    started: Instant,
    token: CancellationToken,
}

/// Registry of in-flight invocations.
#[derive(Debug, Default)]
pub struct ActiveCommands {
    next: AtomicU64,
    entries: Mutex<BTreeMap<u64, Entry>>,
}

impl ActiveCommands {
    /// Records an invocation until the returned guard is dropped.
    pub(crate) fn start(&self, invocation: &Invocation, token: CancellationToken) -> ActiveGuard<'_> {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries().insert(
            id,
            Entry {
                instruction_set: invocation.instruction_set.clone(),
                command: invocation.command.clone(),
                session: invocation.session,
                correlation_id: invocation.correlation_id,
                started: Instant::now(),
                token,
            },
        );
        ActiveGuard { owner: self, id }
    }

    /// In-flight invocations ordered by start.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActiveCommand> {
        self.entries()
            .iter()
            .map(|(id, entry)| ActiveCommand {
                invocation: *id,
                instruction_set: entry.instruction_set.clone(),
                command: entry.command.clone(),
                session: entry.session,
                correlation_id: entry.correlation_id,
                elapsed_ms: u64::try_from(entry.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            })
            .collect()
    }

    /// Cancels invocations started by `session` with `correlation_id`.
    ///
    /// Returns true when at least one invocation was flagged.
    pub fn cancel(&self, session: SessionId, correlation_id: CorrelationId) -> bool {
        self.cancel_matching(|entry| {
            entry.session == session && entry.correlation_id == correlation_id
        }) > 0
    }

    /// Cancels every invocation started by `session`.
    pub fn cancel_origin(&self, session: SessionId) -> usize {
        self.cancel_matching(|entry| entry.session == session)
    }

    /// Number of in-flight invocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true when nothing is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn cancel_matching(&self, predicate: impl Fn(&Entry) -> bool) -> usize {
        let entries = self.entries();
        let mut cancelled = 0;
        for entry in entries.values().filter(|entry| predicate(entry)) {
            entry.token.cancel();
            cancelled += 1;
        }
        cancelled
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes its invocation from [`ActiveCommands`] when dropped.
#[derive(Debug)]
pub(crate) struct ActiveGuard<'a> {
    owner: &'a ActiveCommands,
    id: u64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.owner.entries().remove(&self.id);
    }
}
