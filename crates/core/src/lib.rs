//! databridge domain types and the configuration-resolution engine.
//!
//! This crate is the leaf of the workspace: no async runtime, no I/O. It
//! provides the building blocks the pipeline crate orchestrates:
//!
//! - [`StreamData`] — the tagged record flowing between stages.
//! - [`StepStore`] — per-run, write-once, name-keyed store of task outputs.
//! - [`ParamSpec`] / [`resolve_params`] — static / `macro:` / `step:`
//!   parameter resolution.
//! - [`interpolate`] — `::name::` placeholder substitution in path
//!   templates.
//! - [`MacroRegistry`] — named zero-argument functions invoked during
//!   resolution.
//! - [`StreamConfig`] — the validated-at-construction stream configuration
//!   model.

pub mod config;
pub mod error;
pub mod interpolate;
pub mod macros;
pub mod params;
pub mod record;
pub mod store;

pub use config::{
    DestConfig, ErrorPolicy, ExtractTask, LoadTask, Protocol, SourceConfig, StreamConfig,
    StreamPolicy,
};
pub use error::{ConfigError, ResolveError, StoreError};
pub use interpolate::interpolate;
pub use macros::MacroRegistry;
pub use params::{resolve_params, resolve_recipients, ParamSpec};
pub use record::{DataFormat, RecordValue, StreamData, Table};
pub use store::StepStore;
