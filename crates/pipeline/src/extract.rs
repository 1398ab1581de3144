//! Ordered execution of a stream's extract tasks.
//!
//! Tasks run in configuration order; each completed task's record is
//! written into the Step Store immediately, so a later task's `step:`
//! query parameters can be fed by an earlier task's output (the
//! successive-query pattern). The default policy is fail-fast: one
//! failure aborts remaining extraction, because partially-extracted data
//! is assumed unsafe to transform.

use std::time::Instant;

use databridge_core::{
    interpolate, resolve_params, ErrorPolicy, ExtractTask, MacroRegistry, ResolveError, StepStore,
    StreamConfig,
};

use crate::adapter::{AdapterError, AdapterRegistry, ExtractContext};
use crate::error::StreamError;
use crate::policy::{run_with_policy, Disposition};
use crate::report::{Stage, TaskOutcome};

/// One task attempt's failure, before policy classification.
#[derive(Debug)]
enum TaskError {
    Resolve(ResolveError),
    Adapter(AdapterError),
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve(e) => e.fmt(f),
            Self::Adapter(e) => e.fmt(f),
        }
    }
}

/// Drives a stream's extract tasks.
pub struct Extractor<'a> {
    stream: &'a str,
    config: &'a StreamConfig,
    adapters: &'a AdapterRegistry,
    macros: &'a MacroRegistry,
}

impl<'a> Extractor<'a> {
    /// Create an extractor over one stream's configuration.
    pub fn new(
        stream: &'a str,
        config: &'a StreamConfig,
        adapters: &'a AdapterRegistry,
        macros: &'a MacroRegistry,
    ) -> Self {
        Self {
            stream,
            config,
            adapters,
            macros,
        }
    }

    /// Run every extract task in declared order, populating `store`.
    ///
    /// Appends one [`TaskOutcome`] per attempted task to `outcomes`.
    /// Returns `Err` when a failure is fatal under `policy`; recorded
    /// failures leave their output absent from the store and continue.
    pub async fn extract(
        &self,
        store: &mut StepStore,
        policy: ErrorPolicy,
        outcomes: &mut Vec<TaskOutcome>,
    ) -> Result<(), StreamError> {
        for task in &self.config.extract {
            let started = Instant::now();

            // Immutable reborrow for the (possibly retried) attempts; the
            // store is only written once the task has succeeded.
            let store_view: &StepStore = store;
            let result = run_with_policy(policy, Disposition::Abort, move || {
                self.run_task(task, store_view)
            })
            .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(record) => {
                    let format = record.format();
                    store.put(task.output.as_str(), record)?;
                    tracing::info!(
                        stream = %self.stream,
                        task = %task.name,
                        output = %task.output,
                        format = %format,
                        duration_ms,
                        "Extract task completed",
                    );
                    outcomes.push(TaskOutcome::ok(
                        &task.name,
                        Stage::Extract,
                        format!("produced '{}' ({format})", task.output),
                        duration_ms,
                    ));
                }
                Err(failure) => {
                    tracing::error!(
                        stream = %self.stream,
                        task = %task.name,
                        attempts = failure.attempts,
                        error = %failure.error,
                        "Extract task failed",
                    );
                    outcomes.push(TaskOutcome::failed(
                        &task.name,
                        Stage::Extract,
                        failure.error.to_string(),
                        duration_ms,
                    ));
                    match failure.disposition {
                        Disposition::Abort => {
                            return Err(match failure.error {
                                TaskError::Resolve(source) => StreamError::Resolve {
                                    task: task.name.clone(),
                                    source,
                                },
                                TaskError::Adapter(e) => StreamError::Extract {
                                    task: task.name.clone(),
                                    detail: e.to_string(),
                                },
                            });
                        }
                        Disposition::Record => continue,
                    }
                }
            }
        }
        Ok(())
    }

    /// One attempt at one task: resolve, interpolate, dispatch.
    ///
    /// All resolution happens before the adapter is touched, so a bad
    /// `step:` reference fails before any query executes.
    async fn run_task(
        &self,
        task: &ExtractTask,
        store: &StepStore,
    ) -> Result<databridge_core::StreamData, TaskError> {
        // Checked at validation; normalized here for direct callers.
        let Some(source) = self.config.sources.get(&task.source) else {
            return Err(TaskError::Adapter(AdapterError::Protocol(format!(
                "source '{}' is not declared",
                task.source
            ))));
        };

        let path_params = resolve_params(&task.path_params, self.macros, store)
            .map_err(TaskError::Resolve)?;

        // Exactly one template-bearing field is present per protocol
        // (enforced at validation); interpolate whichever one it is.
        let (query_file, remote_file) = match (&task.query_file, &task.remote_file) {
            (Some(t), _) => (
                Some(interpolate(t, &path_params).map_err(TaskError::Resolve)?),
                None,
            ),
            (None, Some(t)) => (
                None,
                Some(interpolate(t, &path_params).map_err(TaskError::Resolve)?),
            ),
            (None, None) if path_params.is_empty() => (None, None),
            (None, None) => {
                // Path params with no template field to consume them.
                return Err(TaskError::Resolve(ResolveError::UnusedParameter {
                    key: path_params.keys().next().cloned().unwrap_or_default(),
                }));
            }
        };

        // The remote extract path must reference a file; the interpolated
        // values could have introduced a trailing slash the static check
        // could not see.
        if let Some(path) = &remote_file {
            if path.ends_with('/') {
                return Err(TaskError::Adapter(AdapterError::Protocol(format!(
                    "remote file path '{path}' resolves to a directory reference"
                ))));
            }
        }

        let query_params =
            resolve_params(&task.query_params, self.macros, store).map_err(TaskError::Resolve)?;

        let adapter = self
            .adapters
            .extract_for(source.protocol())
            .map_err(TaskError::Adapter)?;

        adapter
            .extract(ExtractContext {
                stream: self.stream,
                task: &task.name,
                source,
                query_file,
                query_params,
                remote_file,
            })
            .await
            .map_err(TaskError::Adapter)
    }
}
