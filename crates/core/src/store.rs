//! Per-run, name-keyed store of task outputs.
//!
//! Created empty at stream start, populated by each completed extract task,
//! read by later tasks, and dropped at stream end. Write-once per name:
//! a later task may read any earlier entry but never replace it. One stream
//! run executes on one logical thread of control, so no locking is needed.

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::record::StreamData;

/// Append-only, name-keyed record of every task's output within one run.
#[derive(Debug, Clone, Default)]
pub struct StepStore {
    outputs: BTreeMap<String, StreamData>,
}

impl StepStore {
    /// Create an empty store for a new stream run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task's output under `name`.
    ///
    /// Fails with [`StoreError::DuplicateOutput`] if `name` was already
    /// produced in this run.
    pub fn put(&mut self, name: impl Into<String>, record: StreamData) -> Result<(), StoreError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(StoreError::DuplicateOutput(name));
        }
        self.outputs.insert(name, record);
        Ok(())
    }

    /// Look up an earlier task's output by name.
    pub fn get(&self, name: &str) -> Option<&StreamData> {
        self.outputs.get(name)
    }

    /// Whether `name` has been produced.
    pub fn contains(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Names of all outputs produced so far, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    /// Number of outputs produced so far.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether the store is still empty.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Consume the store, yielding the full `{name: record}` mapping.
    ///
    /// Used by the orchestrator to hand all extraction outputs to the
    /// transform stage; the store's lifecycle ends here.
    pub fn into_outputs(self) -> BTreeMap<String, StreamData> {
        self.outputs
    }
}
