//! Ordered execution of a stream's load tasks.
//!
//! Load tasks are independent side effects: the default policy records a
//! failing task and carries on with the rest, in deliberate contrast to
//! the fail-fast extraction default. The loader consumes only the records
//! the orchestrator assembled from the transform output; the Step Store is
//! touched solely through `step:` references in email and path parameters.

use std::collections::BTreeMap;
use std::time::Instant;

use databridge_core::{
    interpolate, resolve_params, resolve_recipients, ErrorPolicy, LoadTask, MacroRegistry,
    ResolveError, StepStore, StreamConfig, StreamData,
};

use crate::adapter::{AdapterError, AdapterRegistry, EmailEnvelope, LoadContext};
use crate::error::StreamError;
use crate::policy::{run_with_policy, Disposition};
use crate::report::{Stage, TaskOutcome};
use crate::transform::FunctionRegistry;

/// One task attempt's failure, before policy classification.
#[derive(Debug)]
enum TaskError {
    Resolve(ResolveError),
    Builder(String),
    Adapter(AdapterError),
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve(e) => e.fmt(f),
            Self::Builder(msg) => write!(f, "email builder failed: {msg}"),
            Self::Adapter(e) => e.fmt(f),
        }
    }
}

/// Drives a stream's load tasks.
pub struct Loader<'a> {
    stream: &'a str,
    config: &'a StreamConfig,
    adapters: &'a AdapterRegistry,
    macros: &'a MacroRegistry,
    functions: &'a FunctionRegistry,
}

impl<'a> Loader<'a> {
    /// Create a loader over one stream's configuration.
    pub fn new(
        stream: &'a str,
        config: &'a StreamConfig,
        adapters: &'a AdapterRegistry,
        macros: &'a MacroRegistry,
        functions: &'a FunctionRegistry,
    ) -> Self {
        Self {
            stream,
            config,
            adapters,
            macros,
            functions,
        }
    }

    /// Run every load task in declared order.
    ///
    /// `all_load_data` is the transform output, already contract-checked
    /// against every task's `input` names. `store` is read only through
    /// `step:` parameter references.
    pub async fn load(
        &self,
        all_load_data: &BTreeMap<String, StreamData>,
        store: &StepStore,
        policy: ErrorPolicy,
        outcomes: &mut Vec<TaskOutcome>,
    ) -> Result<(), StreamError> {
        for task in &self.config.load {
            let started = Instant::now();

            let result = run_with_policy(policy, Disposition::Record, move || {
                self.run_task(task, all_load_data, store)
            })
            .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(receipt) => {
                    tracing::info!(
                        stream = %self.stream,
                        task = %task.name,
                        destination = %task.destination,
                        records = receipt.records_processed,
                        duration_ms,
                        "Load task completed",
                    );
                    outcomes.push(TaskOutcome::ok(
                        &task.name,
                        Stage::Load,
                        receipt.detail,
                        duration_ms,
                    ));
                }
                Err(failure) => {
                    tracing::error!(
                        stream = %self.stream,
                        task = %task.name,
                        destination = %task.destination,
                        attempts = failure.attempts,
                        error = %failure.error,
                        "Load task failed",
                    );
                    outcomes.push(TaskOutcome::failed(
                        &task.name,
                        Stage::Load,
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
                                other => StreamError::Load {
                                    task: task.name.clone(),
                                    detail: other.to_string(),
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

    /// One attempt at one task: assemble records, resolve, dispatch.
    async fn run_task(
        &self,
        task: &LoadTask,
        all_load_data: &BTreeMap<String, StreamData>,
        store: &StepStore,
    ) -> Result<crate::adapter::LoadReceipt, TaskError> {
        // Checked at validation; normalized here for direct callers.
        let Some(dest) = self.config.destinations.get(&task.destination) else {
            return Err(TaskError::Adapter(AdapterError::Protocol(format!(
                "destination '{}' is not declared",
                task.destination
            ))));
        };

        // Contract-checked by the orchestrator before loading starts.
        let mut records = BTreeMap::new();
        for input in &task.input {
            let Some(record) = all_load_data.get(input) else {
                return Err(TaskError::Adapter(AdapterError::Protocol(format!(
                    "load input '{input}' missing from transform output"
                ))));
            };
            records.insert(input.clone(), record);
        }

        let path_params =
            resolve_params(&task.path_params, self.macros, store).map_err(TaskError::Resolve)?;
        let remote_dir = match &task.remote_dir {
            Some(template) => {
                Some(interpolate(template, &path_params).map_err(TaskError::Resolve)?)
            }
            None if path_params.is_empty() => None,
            None => {
                return Err(TaskError::Resolve(ResolveError::UnusedParameter {
                    key: path_params.keys().next().cloned().unwrap_or_default(),
                }))
            }
        };

        let email = match &task.email_builder {
            Some(builder_name) => Some(self.build_email(task, builder_name, &records, store)?),
            None => None,
        };

        let adapter = self
            .adapters
            .load_for(dest.protocol())
            .map_err(TaskError::Adapter)?;

        adapter
            .load(LoadContext {
                stream: self.stream,
                task: &task.name,
                dest,
                records,
                remote_dir,
                email,
            })
            .await
            .map_err(TaskError::Adapter)
    }

    /// Resolve email parameters and invoke the task's builder.
    fn build_email(
        &self,
        task: &LoadTask,
        builder_name: &str,
        records: &BTreeMap<String, &StreamData>,
        store: &StepStore,
    ) -> Result<EmailEnvelope, TaskError> {
        let builder = self
            .functions
            .email_builder(builder_name)
            .ok_or_else(|| TaskError::Builder(format!("'{builder_name}' is not registered")))?;

        let recipients_spec = task
            .email_params
            .get("recipients")
            .ok_or_else(|| TaskError::Builder("email_params missing 'recipients'".to_string()))?;
        let recipients = resolve_recipients(recipients_spec, self.macros, store)
            .map_err(TaskError::Resolve)?;

        // The builder sees every email parameter except the recipients,
        // which belong to the transport.
        let builder_params: BTreeMap<_, _> = task
            .email_params
            .iter()
            .filter(|(key, _)| key.as_str() != "recipients")
            .map(|(key, spec)| (key.clone(), spec.clone()))
            .collect();
        let resolved_params = resolve_params(&builder_params, self.macros, store)
            .map_err(TaskError::Resolve)?;

        let message = builder
            .build(records, &resolved_params)
            .map_err(|e| TaskError::Builder(e.0))?;

        Ok(EmailEnvelope {
            recipients,
            message,
        })
    }
}
