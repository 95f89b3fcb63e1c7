//! Two-phase application of staged writes.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use super::transaction::StagedWrite;
use super::{CommitSummary, EnvironmentError};

/// Applies `staged` to `values`.
///
/// Phase 1 computes the final state of every touched key without modifying
/// `values`; a panicking deferred update aborts here. Phase 2 writes the
/// prepared states and cannot fail, so a failed commit never leaves a partial
/// write behind.
pub(super) fn apply(
    values: &mut HashMap<String, Value>,
    staged: Vec<(String, StagedWrite)>,
) -> Result<CommitSummary, EnvironmentError> {
    let prepared = prepare(values, staged)?;

    let mut summary = CommitSummary::default();
    for (key, state) in prepared {
        match state {
            Some(value) => {
                values.insert(key, value);
                summary.written += 1;
            }
            None => {
                values.remove(&key);
                summary.removed += 1;
            }
        }
    }
    Ok(summary)
}

fn prepare(
    values: &HashMap<String, Value>,
    staged: Vec<(String, StagedWrite)>,
) -> Result<Vec<(String, Option<Value>)>, EnvironmentError> {
    let mut prepared: Vec<(String, Option<Value>)> = Vec::new();
    for (key, write) in staged {
        let position = prepared.iter().position(|(existing, _)| *existing == key);
        let current = match position.and_then(|index| prepared.get(index)) {
            Some((_, state)) => state.clone(),
            None => values.get(&key).cloned(),
        };
        let next = panic::catch_unwind(AssertUnwindSafe(|| write.resolve(current.as_ref())))
            .map_err(|_| EnvironmentError::UpdatePanicked { key: key.clone() })?;
        match position.and_then(|index| prepared.get_mut(index)) {
            Some((_, state)) => *state = next,
            None => prepared.push((key, next)),
        }
    }
    Ok(prepared)
}
