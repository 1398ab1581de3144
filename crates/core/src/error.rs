//! Error taxonomy for configuration resolution and the Step Store.
//!
//! Every failure the resolution engine can produce is one of these
//! variants; the pipeline layer normalizes adapter and stage failures into
//! its own taxonomy on top of this one.

use crate::record::DataFormat;

/// Errors raised while resolving parameter specifications and path
/// templates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    /// A `macro:` reference named an unregistered macro.
    #[error("macro '{0}' is not registered")]
    MacroNotFound(String),

    /// A registered macro returned an error when invoked.
    #[error("macro '{name}' failed: {message}")]
    MacroFailed {
        /// Macro name.
        name: String,
        /// Failure description from the macro itself.
        message: String,
    },

    /// A `step:` reference named an output no earlier task produced.
    #[error("step output '{0}' not found in the step store")]
    StepNotFound(String),

    /// A step output exists but its record format is not usable where it
    /// was referenced.
    #[error("step output '{name}' has format '{actual}', expected {expected}")]
    FormatMismatch {
        /// Referenced step output name.
        name: String,
        /// What the call site accepts, e.g. `"list"` or `"a scalar value"`.
        expected: &'static str,
        /// The format the stored record actually has.
        actual: DataFormat,
    },

    /// A `::token::` in a path template had no matching parameter key.
    #[error("placeholder '::{token}::' has no matching parameter key")]
    UnresolvedPlaceholder {
        /// Token name as written in the template.
        token: String,
    },

    /// A parameter key matched no `::token::` in its path template.
    #[error("parameter '{key}' matches no placeholder in the template")]
    UnusedParameter {
        /// The stale parameter key.
        key: String,
    },
}

/// Errors raised by the Step Store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A second write under an already-populated output name.
    #[error("step output '{0}' was already produced in this run")]
    DuplicateOutput(String),
}

/// Configuration validation failure, collecting every finding.
///
/// Validation does not stop at the first problem; all findings are
/// reported together so a misconfigured stream can be fixed in one pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// One or more validation findings; the stream never starts.
    #[error("invalid stream configuration:\n - {}", .0.join("\n - "))]
    Invalid(Vec<String>),
}
