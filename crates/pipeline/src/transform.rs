//! User-supplied function boundaries: transform and email builder.
//!
//! The transform is a pure function over the flat `{name: record}` mapping
//! produced by extraction; it runs exactly once per stream. Email builders
//! compose a message from a load task's record subset. Both are looked up
//! by name in a [`FunctionRegistry`] that the embedding application
//! populates at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use databridge_core::StreamData;
use serde_json::Value;

/// Failure inside a user-supplied transform or email builder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    /// Convenience constructor.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The transform stage: reshape extracted records into load-ready records.
///
/// Output names must cover every load task's declared inputs; extra names
/// are permitted (they become readable through `step:` references in load
/// parameters).
pub trait Transform: Send + Sync {
    /// Apply the transform to the full extraction output.
    fn apply(
        &self,
        data: BTreeMap<String, StreamData>,
    ) -> Result<BTreeMap<String, StreamData>, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(BTreeMap<String, StreamData>) -> Result<BTreeMap<String, StreamData>, TransformError>
        + Send
        + Sync,
{
    fn apply(
        &self,
        data: BTreeMap<String, StreamData>,
    ) -> Result<BTreeMap<String, StreamData>, TransformError> {
        self(data)
    }
}

/// An email attachment: file name plus raw content.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// File name shown in the message.
    pub file_name: String,
    /// Attachment bytes.
    pub content: Vec<u8>,
}

/// A composed email message, transport-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Attachments, in order.
    pub attachments: Vec<Attachment>,
}

/// Builds an email message from a load task's record subset.
///
/// `data` is keyed by the task's declared input names and may be empty;
/// `params` holds the task's resolved email parameters (minus
/// `recipients`, which the loader resolves and hands to the transport).
pub trait EmailBuilder: Send + Sync {
    /// Compose the message.
    fn build(
        &self,
        data: &BTreeMap<String, &StreamData>,
        params: &BTreeMap<String, Value>,
    ) -> Result<EmailMessage, TransformError>;
}

impl<F> EmailBuilder for F
where
    F: Fn(
            &BTreeMap<String, &StreamData>,
            &BTreeMap<String, Value>,
        ) -> Result<EmailMessage, TransformError>
        + Send
        + Sync,
{
    fn build(
        &self,
        data: &BTreeMap<String, &StreamData>,
        params: &BTreeMap<String, Value>,
    ) -> Result<EmailMessage, TransformError> {
        self(data, params)
    }
}

// ---------------------------------------------------------------------------
// FunctionRegistry
// ---------------------------------------------------------------------------

/// Name → transform / email-builder registry for one process.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    transforms: BTreeMap<String, Arc<dyn Transform>>,
    email_builders: BTreeMap<String, Arc<dyn EmailBuilder>>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform under `name`, replacing any previous entry.
    pub fn register_transform(&mut self, name: impl Into<String>, f: impl Transform + 'static) {
        self.transforms.insert(name.into(), Arc::new(f));
    }

    /// Register an email builder under `name`, replacing any previous
    /// entry.
    pub fn register_email_builder(
        &mut self,
        name: impl Into<String>,
        f: impl EmailBuilder + 'static,
    ) {
        self.email_builders.insert(name.into(), Arc::new(f));
    }

    /// Look up a transform by name.
    pub fn transform(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(name).cloned()
    }

    /// Look up an email builder by name.
    pub fn email_builder(&self, name: &str) -> Option<Arc<dyn EmailBuilder>> {
        self.email_builders.get(name).cloned()
    }

    /// Whether a transform named `name` is registered.
    pub fn has_transform(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Whether an email builder named `name` is registered.
    pub fn has_email_builder(&self, name: &str) -> bool {
        self.email_builders.contains_key(name)
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .field(
                "email_builders",
                &self.email_builders.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_register_as_functions() {
        let mut reg = FunctionRegistry::new();
        reg.register_transform("passthrough", |data| Ok(data));
        reg.register_email_builder("empty", |_data: &BTreeMap<String, &StreamData>, _params: &BTreeMap<String, Value>| {
            Ok(EmailMessage {
                subject: "s".into(),
                body: "b".into(),
                attachments: vec![],
            })
        });

        assert!(reg.has_transform("passthrough"));
        assert!(reg.has_email_builder("empty"));
        assert!(!reg.has_transform("missing"));

        let mut data = BTreeMap::new();
        data.insert("a".to_string(), StreamData::int(1));
        let out = reg.transform("passthrough").unwrap().apply(data).unwrap();
        assert_eq!(out["a"], StreamData::int(1));
    }

    #[test]
    fn transform_errors_surface() {
        let mut reg = FunctionRegistry::new();
        reg.register_transform("broken", |_| {
            Err(TransformError::new("missing expected column"))
        });
        let err = reg
            .transform("broken")
            .unwrap()
            .apply(BTreeMap::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "missing expected column");
    }
}
