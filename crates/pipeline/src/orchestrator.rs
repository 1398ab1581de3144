//! The stream state machine.
//!
//! `Created → Validated → Extracting → Transforming → Loading → Completed`,
//! with `Failed` reachable from any non-terminal state. The state machine
//! records outcome; the per-stage policies decide propagation. The
//! orchestrator owns the Step Store's lifecycle — created empty at run
//! start, dropped with the run — and normalizes every failure into the
//! stage taxonomy before it reaches the report: no bare adapter error
//! crosses this boundary.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use databridge_core::{ConfigError, MacroRegistry, StepStore, StreamConfig, StreamData};
use tracing::Instrument;
use uuid::Uuid;

use crate::adapter::AdapterRegistry;
use crate::error::StreamError;
use crate::extract::Extractor;
use crate::load::Loader;
use crate::report::{RunReport, RunStatus, Stage, TaskOutcome, TaskStatus};
use crate::transform::FunctionRegistry;
use crate::validate::validate;

/// Lifecycle state of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed, not yet validated.
    Created,
    /// Configuration validated; ready to run.
    Validated,
    /// Extract tasks running.
    Extracting,
    /// Transform running.
    Transforming,
    /// Load tasks running.
    Loading,
    /// Run finished (possibly with recorded load failures).
    Completed,
    /// Run aborted, or validation failed.
    Failed,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Validated => "validated",
            Self::Extracting => "extracting",
            Self::Transforming => "transforming",
            Self::Loading => "loading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Validates and runs one configured stream.
pub struct StreamOrchestrator {
    name: String,
    config: StreamConfig,
    adapters: Arc<AdapterRegistry>,
    macros: MacroRegistry,
    functions: Arc<FunctionRegistry>,
    state: StreamState,
}

impl StreamOrchestrator {
    /// Construct an orchestrator in the `Created` state.
    ///
    /// Fails immediately if a referenced protocol has no registered
    /// adapter — that is a deployment problem, not a stream problem.
    pub fn new(
        name: impl Into<String>,
        config: StreamConfig,
        adapters: Arc<AdapterRegistry>,
        macros: MacroRegistry,
        functions: Arc<FunctionRegistry>,
    ) -> Result<Self, ConfigError> {
        let mut findings = Vec::new();
        for task in &config.extract {
            if let Some(source) = config.sources.get(&task.source) {
                let protocol = source.protocol();
                if !adapters.has_extract(protocol) {
                    findings.push(format!(
                        "extract task '{}': no extract adapter registered for protocol '{protocol}'",
                        task.name
                    ));
                }
            }
        }
        for task in &config.load {
            if let Some(dest) = config.destinations.get(&task.destination) {
                let protocol = dest.protocol();
                if !adapters.has_load(protocol) {
                    findings.push(format!(
                        "load task '{}': no load adapter registered for protocol '{protocol}'",
                        task.name
                    ));
                }
            }
        }
        if !findings.is_empty() {
            return Err(ConfigError::Invalid(findings));
        }

        Ok(Self {
            name: name.into(),
            config,
            adapters,
            macros,
            functions,
            state: StreamState::Created,
        })
    }

    /// The stream's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Structural and referential validation: `Created → Validated`.
    ///
    /// Failure here is always fatal; the stream never starts.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        match validate(&self.config, &self.macros, &self.functions) {
            Ok(()) => {
                self.state = StreamState::Validated;
                tracing::debug!(stream = %self.name, "Stream configuration validated");
                Ok(())
            }
            Err(err) => {
                self.state = StreamState::Failed;
                tracing::error!(stream = %self.name, error = %err, "Stream configuration invalid");
                Err(err)
            }
        }
    }

    /// Run the stream to completion, consuming the orchestrator.
    ///
    /// Validates first if still `Created`. `Failed` is terminal — a stream
    /// whose validation already failed refuses to run. A configuration
    /// error is the only failure that escapes as `Err`; everything after
    /// validation is captured in the returned [`RunReport`].
    pub async fn run(mut self) -> Result<RunReport, ConfigError> {
        match self.state {
            StreamState::Created => self.validate()?,
            StreamState::Validated => {}
            state => {
                return Err(ConfigError::Invalid(vec![format!(
                    "stream '{}' cannot run from state '{state}'",
                    self.name
                )]));
            }
        }

        let run_id = Uuid::now_v7();
        let span = tracing::info_span!("stream_run", stream = %self.name, run_id = %run_id);
        async move { Ok(self.run_inner(run_id).await) }
            .instrument(span)
            .await
    }

    async fn run_inner(mut self, run_id: Uuid) -> RunReport {
        let started_at = Utc::now();
        let mut outcomes = Vec::new();
        let mut store = StepStore::new();

        tracing::info!(state = %StreamState::Extracting, "Stream run started");
        self.state = StreamState::Extracting;
        let extractor = Extractor::new(&self.name, &self.config, &self.adapters, &self.macros);
        if let Err(err) = extractor
            .extract(&mut store, self.config.policy.extract, &mut outcomes)
            .await
        {
            return self.fail(run_id, started_at, outcomes, err);
        }

        self.state = StreamState::Transforming;
        let transform_started = Instant::now();
        let output = match self.apply_transform(&store) {
            Ok(output) => {
                outcomes.push(TaskOutcome::ok(
                    &self.config.transform,
                    Stage::Transform,
                    format!("produced {} record(s)", output.len()),
                    transform_started.elapsed().as_millis() as u64,
                ));
                output
            }
            Err(err) => {
                outcomes.push(TaskOutcome::failed(
                    &self.config.transform,
                    Stage::Transform,
                    err.to_string(),
                    transform_started.elapsed().as_millis() as u64,
                ));
                return self.fail(run_id, started_at, outcomes, err);
            }
        };

        // Transform outputs become step-referenceable under names the
        // extraction did not already claim; load data itself always comes
        // from the transform output.
        for (name, record) in &output {
            if !store.contains(name) {
                if let Err(err) = store.put(name.as_str(), record.clone()) {
                    return self.fail(run_id, started_at, outcomes, StreamError::Store(err));
                }
            }
        }

        self.state = StreamState::Loading;
        let loader = Loader::new(
            &self.name,
            &self.config,
            &self.adapters,
            &self.macros,
            &self.functions,
        );
        if let Err(err) = loader
            .load(&output, &store, self.config.policy.load, &mut outcomes)
            .await
        {
            return self.fail(run_id, started_at, outcomes, err);
        }

        self.state = StreamState::Completed;
        let status = if outcomes.iter().any(|o| o.status == TaskStatus::Failed) {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        };
        tracing::info!(
            state = %self.state,
            status = %status,
            tasks = outcomes.len(),
            "Stream run complete",
        );

        RunReport {
            run_id,
            stream: self.name,
            status,
            started_at,
            finished_at: Utc::now(),
            tasks: outcomes,
        }
    }

    /// Run the transform once over the full extraction output and check
    /// its contract against the configured load inputs.
    fn apply_transform(
        &self,
        store: &StepStore,
    ) -> Result<BTreeMap<String, StreamData>, StreamError> {
        let transform = self.functions.transform(&self.config.transform).ok_or_else(|| {
            StreamError::Transform {
                name: self.config.transform.clone(),
                detail: "transform is not registered".to_string(),
            }
        })?;

        let input = store.clone().into_outputs();
        let output = transform
            .apply(input)
            .map_err(|e| StreamError::Transform {
                name: self.config.transform.clone(),
                detail: e.0,
            })?;

        let mut missing = Vec::new();
        for task in &self.config.load {
            for input_name in &task.input {
                if !output.contains_key(input_name) && !missing.contains(input_name) {
                    missing.push(input_name.clone());
                }
            }
        }
        if !missing.is_empty() {
            return Err(StreamError::TransformContract { missing });
        }

        Ok(output)
    }

    /// Terminal failure: record state, log, and build the failed report.
    fn fail(
        mut self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        outcomes: Vec<TaskOutcome>,
        err: StreamError,
    ) -> RunReport {
        self.state = StreamState::Failed;
        tracing::error!(
            state = %self.state,
            error = %err,
            "Stream run aborted",
        );
        RunReport {
            run_id,
            stream: self.name,
            status: RunStatus::Failed,
            started_at,
            finished_at: Utc::now(),
            tasks: outcomes,
        }
    }
}
