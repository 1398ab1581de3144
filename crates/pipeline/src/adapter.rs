//! Protocol adapter traits and registry.
//!
//! One extract method and one load method per supported wire protocol.
//! Adapters receive fully resolved inputs — interpolated paths, resolved
//! query parameters, composed email envelopes — and own their connections:
//! acquired inside `extract`/`load`, released before returning, never held
//! across tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use databridge_core::{DestConfig, Protocol, SourceConfig, StreamData};
use serde_json::Value;

use crate::transform::EmailMessage;

/// Failure inside a protocol adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Underlying I/O failure (file, socket).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol-level failure with a human-readable description.
    #[error("{0}")]
    Protocol(String),

    /// No adapter registered for the requested protocol.
    #[error("no adapter registered for protocol '{0}'")]
    Unregistered(Protocol),
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Resolved inputs for one extract dispatch.
#[derive(Debug)]
pub struct ExtractContext<'a> {
    /// Stream name, for logging.
    pub stream: &'a str,
    /// Task name, for logging.
    pub task: &'a str,
    /// The task's source configuration.
    pub source: &'a SourceConfig,
    /// Interpolated local query-file path (sql sources).
    pub query_file: Option<String>,
    /// Resolved query parameters (sql sources).
    pub query_params: BTreeMap<String, Value>,
    /// Interpolated remote file path (file-transfer sources). Always a
    /// file reference, never a directory.
    pub remote_file: Option<String>,
}

/// A composed email ready for transport.
#[derive(Debug, Clone)]
pub struct EmailEnvelope {
    /// Resolved recipient addresses, at least one.
    pub recipients: Vec<String>,
    /// The composed message.
    pub message: EmailMessage,
}

/// Resolved inputs for one load dispatch.
#[derive(Debug)]
pub struct LoadContext<'a> {
    /// Stream name, for logging.
    pub stream: &'a str,
    /// Task name, for logging.
    pub task: &'a str,
    /// The task's destination configuration.
    pub dest: &'a DestConfig,
    /// The records this task consumes, keyed by input name.
    pub records: BTreeMap<String, &'a StreamData>,
    /// Interpolated remote directory (file-transfer destinations). The
    /// adapter determines the final filename from each record.
    pub remote_dir: Option<String>,
    /// Composed email (smtp destinations).
    pub email: Option<EmailEnvelope>,
}

/// Outcome detail from a successful load dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReceipt {
    /// Human-readable summary, e.g. the remote path written.
    pub detail: String,
    /// Records delivered, when the protocol can count them.
    pub records_processed: Option<u64>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One wire protocol's extract method.
///
/// The returned record's format is whatever the protocol guarantees
/// (tabular for sql, bytes for file transfers).
#[async_trait]
pub trait ExtractAdapter: Send + Sync {
    /// Pull data from the source described by `ctx`.
    async fn extract(&self, ctx: ExtractContext<'_>) -> Result<StreamData, AdapterError>;
}

/// One wire protocol's load method.
#[async_trait]
pub trait LoadAdapter: Send + Sync {
    /// Push the context's records to the destination.
    async fn load(&self, ctx: LoadContext<'_>) -> Result<LoadReceipt, AdapterError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Protocol → adapter maps for both directions.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    extract: BTreeMap<Protocol, Arc<dyn ExtractAdapter>>,
    load: BTreeMap<Protocol, Arc<dyn LoadAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the extract adapter for `protocol`.
    pub fn register_extract(&mut self, protocol: Protocol, adapter: Arc<dyn ExtractAdapter>) {
        self.extract.insert(protocol, adapter);
    }

    /// Register the load adapter for `protocol`.
    pub fn register_load(&mut self, protocol: Protocol, adapter: Arc<dyn LoadAdapter>) {
        self.load.insert(protocol, adapter);
    }

    /// The extract adapter for `protocol`.
    pub fn extract_for(&self, protocol: Protocol) -> Result<Arc<dyn ExtractAdapter>, AdapterError> {
        self.extract
            .get(&protocol)
            .cloned()
            .ok_or(AdapterError::Unregistered(protocol))
    }

    /// The load adapter for `protocol`.
    pub fn load_for(&self, protocol: Protocol) -> Result<Arc<dyn LoadAdapter>, AdapterError> {
        self.load
            .get(&protocol)
            .cloned()
            .ok_or(AdapterError::Unregistered(protocol))
    }

    /// Whether an extract adapter is registered for `protocol`.
    pub fn has_extract(&self, protocol: Protocol) -> bool {
        self.extract.contains_key(&protocol)
    }

    /// Whether a load adapter is registered for `protocol`.
    pub fn has_load(&self, protocol: Protocol) -> bool {
        self.load.contains_key(&protocol)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("extract", &self.extract.keys().collect::<Vec<_>>())
            .field("load", &self.load.keys().collect::<Vec<_>>())
            .finish()
    }
}
