//! Staged view of the environment handed to command handlers.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{EnvironmentError, GlobalEnvironment};

/// Function applied to the committed value of a key at commit time.
pub(super) type UpdateFn = Arc<dyn Fn(Option<&Value>) -> Option<Value> + Send + Sync>;

/// A single staged write.
#[derive(Clone)]
pub(super) enum StagedWrite {
    Set(Value),
    Remove,
    Update(UpdateFn),
}

impl StagedWrite {
    /// Applies the write on top of `current`.
    pub(super) fn resolve(&self, current: Option<&Value>) -> Option<Value> {
        match self {
            Self::Set(value) => Some(value.clone()),
            Self::Remove => None,
            Self::Update(update) => update(current),
        }
    }
}

impl fmt::Debug for StagedWrite {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(value) => formatter.debug_tuple("Set").field(value).finish(),
            Self::Remove => formatter.write_str("Remove"),
            Self::Update(_) => formatter.write_str("Update(..)"),
        }
    }
}

/// Writes staged by one command invocation.
///
/// Reads see the committed store overlaid with this transaction's own staged
/// writes. Nothing becomes visible to other invocations until the dispatcher
/// commits the transaction; dropping it discards every staged write.
pub struct EnvTransaction {
    store: Arc<GlobalEnvironment>,
    staged: Vec<(String, StagedWrite)>,
}

impl EnvTransaction {
    pub(super) fn new(store: Arc<GlobalEnvironment>) -> Self {
        Self {
            store,
            staged: Vec::new(),
        }
    }

    /// Reads `key`, including this transaction's staged writes.
    ///
    /// Deferred updates are previewed against the currently committed value;
    /// the value finally written is computed again at commit time.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Poisoned`] when the store lock is poisoned.
    pub fn get(&self, key: &str) -> Result<Option<Value>, EnvironmentError> {
        let committed = self.store.get(key)?;
        Ok(self
            .staged
            .iter()
            .filter(|(staged_key, _)| staged_key == key)
            .fold(committed, |current, (_, write)| write.resolve(current.as_ref())))
    }

    /// Reads `key`, substituting `default` when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Poisoned`] when the store lock is poisoned.
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value, EnvironmentError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Stages `key = value`.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.staged.push((key.into(), StagedWrite::Set(value)));
    }

    /// Stages removal of `key`. Removing an absent key is not an error.
    pub fn remove(&mut self, key: impl Into<String>) {
        self.staged.push((key.into(), StagedWrite::Remove));
    }

    /// Stages a read-modify-write applied under the commit lock.
    ///
    /// `update` receives the value committed at the time of the commit (after
    /// any earlier writes staged by this transaction) and returns the new
    /// value, or `None` to remove the key.
    pub fn update<F>(&mut self, key: impl Into<String>, update: F)
    where
        F: Fn(Option<&Value>) -> Option<Value> + Send + Sync + 'static,
    {
        self.staged
            .push((key.into(), StagedWrite::Update(Arc::new(update))));
    }

    /// Returns true when nothing has been staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Keys touched by this transaction in first-write order.
    #[must_use]
    pub fn staged_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in &self.staged {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }

    pub(super) fn belongs_to(&self, store: &Arc<GlobalEnvironment>) -> bool {
        Arc::ptr_eq(&self.store, store)
    }

    pub(super) fn into_staged(self) -> Vec<(String, StagedWrite)> {
        self.staged
    }
}

impl fmt::Debug for EnvTransaction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EnvTransaction")
            .field("staged", &self.staged)
            .finish_non_exhaustive()
    }
}
