//! Stream orchestration: extract → transform → load.
//!
//! This crate drives the engine defined by `databridge-core`:
//!
//! - [`ExtractAdapter`] / [`LoadAdapter`] — the protocol seams; one
//!   implementation per wire protocol, registered in an
//!   [`AdapterRegistry`].
//! - [`Transform`] / [`EmailBuilder`] — the user-supplied function
//!   boundaries, registered in a [`FunctionRegistry`].
//! - [`Extractor`] / [`Loader`] — ordered task execution with per-stage
//!   error policies.
//! - [`StreamOrchestrator`] — the state machine owning the Step Store
//!   lifecycle and producing a [`RunReport`].

pub mod adapter;
pub mod error;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod policy;
pub mod report;
pub mod transform;
pub mod validate;

pub use adapter::{
    AdapterError, AdapterRegistry, EmailEnvelope, ExtractAdapter, ExtractContext, LoadAdapter,
    LoadContext, LoadReceipt,
};
pub use error::StreamError;
pub use extract::Extractor;
pub use load::Loader;
pub use orchestrator::{StreamOrchestrator, StreamState};
pub use policy::{run_with_policy, Disposition, PolicyFailure};
pub use report::{RunReport, RunStatus, Stage, TaskOutcome, TaskStatus};
pub use transform::{Attachment, EmailBuilder, EmailMessage, FunctionRegistry, Transform, TransformError};
pub use validate::validate;
