//! Cooperative cancellation shared between the dispatcher and running handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flag observed by a running command and by the commit step.
///
/// Cancellation is only honoured up to the commit boundary: once the
/// environment has accepted a transaction, cancelling the token has no effect
/// on the written values.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
