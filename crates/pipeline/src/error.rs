//! Stage-level error taxonomy.
//!
//! Every failure surfaced by the orchestrator is one of these variants,
//! carrying the identity of the task it occurred in. Raw adapter errors
//! never cross the orchestrator boundary; they are normalized here first.

use databridge_core::{ConfigError, ResolveError, StoreError};

/// A stream-run failure, normalized and carrying task identity.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Configuration validation failed; the stream never starts.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Parameter or placeholder resolution failed inside a task.
    #[error("resolution failed in task '{task}': {source}")]
    Resolve {
        /// The task whose parameters were being resolved.
        task: String,
        /// The underlying resolution failure.
        source: ResolveError,
    },

    /// An extract task's underlying I/O failed.
    #[error("extract task '{task}' failed: {detail}")]
    Extract {
        /// Failing task name.
        task: String,
        /// Normalized adapter failure description.
        detail: String,
    },

    /// The user-supplied transform function failed.
    #[error("transform '{name}' failed: {detail}")]
    Transform {
        /// Registered transform name.
        name: String,
        /// Failure description from the transform.
        detail: String,
    },

    /// The transform output is out of sync with load configuration:
    /// declared load inputs are missing from it.
    #[error("transform output is missing load input(s): {}", .missing.join(", "))]
    TransformContract {
        /// Load input names absent from the transform output.
        missing: Vec<String>,
    },

    /// A load task failed and the stream's load policy is fail-fast.
    #[error("load task '{task}' failed: {detail}")]
    Load {
        /// Failing task name.
        task: String,
        /// Normalized adapter failure description.
        detail: String,
    },

    /// A Step Store invariant was violated at run time.
    #[error("step store: {0}")]
    Store(#[from] StoreError),
}
