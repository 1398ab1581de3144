//! Per-run outcome reporting.
//!
//! Every task contributes a [`TaskOutcome`]; the orchestrator aggregates
//! them into a [`RunReport`] whose status the CLI layer maps onto a
//! process exit code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The pipeline stage a task ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Extraction.
    Extract,
    /// The single transform step.
    Transform,
    /// Loading.
    Load,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Extract => "extract",
            Self::Transform => "transform",
            Self::Load => "load",
        };
        f.write_str(s)
    }
}

/// Whether a task succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task completed.
    Ok,
    /// The task failed; `detail` carries the normalized cause.
    Failed,
}

/// One task's outcome within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Task name from configuration (or the transform's registered name).
    pub task: String,
    /// Stage the task ran in.
    pub stage: Stage,
    /// Success or failure.
    pub status: TaskStatus,
    /// Human-readable detail: receipt summary or failure cause.
    pub detail: String,
    /// Wall-clock duration, milliseconds.
    pub duration_ms: u64,
}

impl TaskOutcome {
    /// A successful outcome.
    pub fn ok(task: impl Into<String>, stage: Stage, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            task: task.into(),
            stage,
            status: TaskStatus::Ok,
            detail: detail.into(),
            duration_ms,
        }
    }

    /// A failed outcome.
    pub fn failed(
        task: impl Into<String>,
        stage: Stage,
        detail: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            task: task.into(),
            stage,
            status: TaskStatus::Failed,
            detail: detail.into(),
            duration_ms,
        }
    }
}

/// Overall outcome of a stream run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every task completed.
    Success,
    /// The run completed but at least one load task failed.
    PartialFailure,
    /// The run aborted before completion.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::PartialFailure => "partial-failure",
            Self::Failed => "failure",
        };
        f.write_str(s)
    }
}

/// The full record of one stream run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run id.
    pub run_id: Uuid,
    /// Stream name.
    pub stream: String,
    /// Overall status.
    pub status: RunStatus,
    /// Run start (UTC).
    pub started_at: DateTime<Utc>,
    /// Run end (UTC).
    pub finished_at: DateTime<Utc>,
    /// Per-task outcomes, in execution order.
    pub tasks: Vec<TaskOutcome>,
}

impl RunReport {
    /// Process exit code for this run: `0` success, `1` failure,
    /// `2` partial failure.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Success => 0,
            RunStatus::Failed => 1,
            RunStatus::PartialFailure => 2,
        }
    }

    /// The failed tasks, in execution order.
    pub fn failed_tasks(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: RunStatus, tasks: Vec<TaskOutcome>) -> RunReport {
        RunReport {
            run_id: Uuid::now_v7(),
            stream: "test".into(),
            status,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            tasks,
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(report(RunStatus::Success, vec![]).exit_code(), 0);
        assert_eq!(report(RunStatus::Failed, vec![]).exit_code(), 1);
        assert_eq!(report(RunStatus::PartialFailure, vec![]).exit_code(), 2);
    }

    #[test]
    fn failed_tasks_filter() {
        let r = report(
            RunStatus::PartialFailure,
            vec![
                TaskOutcome::ok("a", Stage::Load, "written", 3),
                TaskOutcome::failed("b", Stage::Load, "host unreachable", 5),
                TaskOutcome::ok("c", Stage::Load, "sent", 4),
            ],
        );
        let failed: Vec<_> = r.failed_tasks().map(|t| t.task.as_str()).collect();
        assert_eq!(failed, vec!["b"]);
    }

    #[test]
    fn status_display() {
        assert_eq!(RunStatus::PartialFailure.to_string(), "partial-failure");
    }
}
