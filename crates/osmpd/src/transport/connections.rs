//! Bookkeeping of open client sessions so shutdown can close them.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{ConnectionStream, LISTENER_TARGET};

#[derive(Debug, Default)]
struct Open {
    next: u64,
    streams: HashMap<u64, ConnectionStream>,
}

/// Socket handles of every session still being served.
#[derive(Debug, Default)]
pub(crate) struct OpenSessions {
    open: Mutex<Open>,
    closed: Condvar,
}

impl OpenSessions {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records `stream` until the returned guard drops.
    pub(crate) fn track(self: &Arc<Self>, stream: &ConnectionStream) -> io::Result<SessionGuard> {
        let handle = stream.try_clone()?;
        let mut open = self.lock();
        open.next += 1;
        let slot = open.next;
        open.streams.insert(slot, handle);
        Ok(SessionGuard {
            slot,
            sessions: Arc::clone(self),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().streams.len()
    }

    /// Shuts down every tracked socket and waits up to `grace` for the
    /// sessions to wind down. Returns the number still open afterwards.
    ///
    /// A closed socket ends the session's read loop, which cancels its
    /// in-flight commands and drops its subscriptions.
    pub(crate) fn close_all(&self, grace: Duration) -> usize {
        let mut open = self.lock();
        for (slot, stream) in &open.streams {
            if let Err(error) = stream.shutdown() {
                debug!(target: LISTENER_TARGET, slot, %error, "session socket already closed");
            }
        }

        let deadline = Instant::now() + grace;
        while !open.streams.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            open = self
                .closed
                .wait_timeout(open, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        open.streams.len()
    }

    fn release(&self, slot: u64) {
        self.lock().streams.remove(&slot);
        self.closed.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, Open> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a session registered while its handler runs.
#[derive(Debug)]
pub(crate) struct SessionGuard {
    slot: u64,
    sessions: Arc<OpenSessions>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.release(self.slot);
    }
}
