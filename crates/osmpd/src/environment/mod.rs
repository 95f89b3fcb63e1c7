//! Shared key/value context visible to command execution.
//!
//! Handlers never receive a mutable reference to the store. They work on an
//! [`EnvTransaction`] that stages writes; the dispatcher commits the staged
//! writes only when the handler succeeds. Commits are serialised by the store's
//! write lock, so two transactions touching the same key are applied one after
//! the other and never interleave.

mod commit;
mod transaction;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::cancellation::CancellationToken;

pub use self::transaction::EnvTransaction;

pub(crate) const ENVIRONMENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::environment");

/// Errors raised while reading or committing the environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    /// A thread panicked while holding the store lock.
    #[error("environment store lock poisoned")]
    Poisoned,
    /// A deferred update function panicked during commit.
    #[error("deferred update of '{key}' panicked during commit")]
    UpdatePanicked {
        /// Key whose update failed.
        key: String,
    },
    /// The owning invocation was cancelled before the commit took effect.
    #[error("commit abandoned: invocation was cancelled")]
    Cancelled,
    /// The transaction was opened against a different store.
    #[error("transaction belongs to a different environment store")]
    ForeignTransaction,
}

impl<T> From<PoisonError<T>> for EnvironmentError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// Counts reported by a successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Keys whose final staged state was a value.
    pub written: usize,
    /// Keys whose final staged state was removal.
    pub removed: usize,
}

/// Process-wide variable store.
#[derive(Debug, Default)]
pub struct GlobalEnvironment {
    values: RwLock<HashMap<String, Value>>,
}

impl GlobalEnvironment {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with initial values.
    #[must_use]
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(key, value)| (key.into(), value))
                    .collect(),
            ),
        }
    }

    /// Reads the committed value of `key`.
    ///
    /// Absence is reported as `None`; no default is ever substituted.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Poisoned`] when the store lock is poisoned.
    pub fn get(&self, key: &str) -> Result<Option<Value>, EnvironmentError> {
        Ok(self.values.read()?.get(key).cloned())
    }

    /// Number of committed keys.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Poisoned`] when the store lock is poisoned.
    pub fn len(&self) -> Result<usize, EnvironmentError> {
        Ok(self.values.read()?.len())
    }

    /// Returns true when nothing has been committed.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Poisoned`] when the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, EnvironmentError> {
        Ok(self.values.read()?.is_empty())
    }

    /// Ordered copy of every committed entry.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Poisoned`] when the store lock is poisoned.
    pub fn snapshot(&self) -> Result<BTreeMap<String, Value>, EnvironmentError> {
        Ok(self
            .values
            .read()?
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    /// Opens a transaction that stages writes against this store.
    #[must_use]
    pub fn begin(self: &Arc<Self>) -> EnvTransaction {
        EnvTransaction::new(Arc::clone(self))
    }

    /// Applies a transaction's staged writes atomically.
    ///
    /// The write lock is held for the whole commit. `token` is re-checked under
    /// the lock, so a cancellation observed here discards every staged write.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError`] when the invocation was cancelled, when a
    /// deferred update panics, or when the lock is poisoned. In every error
    /// case the committed state is left untouched.
    pub fn commit(
        self: &Arc<Self>,
        transaction: EnvTransaction,
        token: &CancellationToken,
    ) -> Result<CommitSummary, EnvironmentError> {
        if !transaction.belongs_to(self) {
            return Err(EnvironmentError::ForeignTransaction);
        }
        let staged = transaction.into_staged();
        if staged.is_empty() {
            return if token.is_cancelled() {
                Err(EnvironmentError::Cancelled)
            } else {
                Ok(CommitSummary::default())
            };
        }

        let mut values = self.values.write()?;
        if token.is_cancelled() {
            return Err(EnvironmentError::Cancelled);
        }
        let summary = commit::apply(&mut values, staged)?;
        debug!(
            target: ENVIRONMENT_TARGET,
            written = summary.written,
            removed = summary.removed,
            "environment transaction committed"
        );
        Ok(summary)
    }
}
