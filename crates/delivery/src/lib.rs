//! Concrete protocol adapters shipped with databridge.
//!
//! Two protocols are implemented here: SMTP delivery via `lettre` and
//! mounted-fileshare transfer via `tokio::fs`. SQL, SFTP, and cloud-drive
//! adapters are trait implementations the embedding application provides
//! and registers alongside these.

pub mod fileshare;
pub mod render;
pub mod smtp;

use std::sync::Arc;

use databridge_core::Protocol;
use databridge_pipeline::{AdapterError, AdapterRegistry};

pub use fileshare::FileshareDelivery;
pub use smtp::SmtpDelivery;

/// Failure inside one of the shipped adapters.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// A record could not be rendered as file content.
    #[error("rendering record '{record}' failed: {detail}")]
    Render {
        /// The record's name.
        record: String,
        /// Failure description.
        detail: String,
    },

    /// An email address could not be parsed.
    #[error("email address '{address}' is invalid")]
    Address {
        /// The offending address.
        address: String,
    },

    /// SMTP transport-level failure (connection, authentication).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The MIME message could not be assembled.
    #[error("email build error: {0}")]
    Build(String),
}

impl From<DeliveryError> for AdapterError {
    fn from(err: DeliveryError) -> Self {
        AdapterError::Protocol(err.to_string())
    }
}

/// An [`AdapterRegistry`] pre-wired with the shipped adapters: fileshare in
/// both directions, SMTP for loading. Callers register SQL/SFTP/drive
/// implementations on top.
pub fn default_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    let fileshare = Arc::new(FileshareDelivery::new());
    registry.register_extract(Protocol::Fileshare, fileshare.clone());
    registry.register_load(Protocol::Fileshare, fileshare);
    registry.register_load(Protocol::Smtp, Arc::new(SmtpDelivery::new()));
    registry
}
