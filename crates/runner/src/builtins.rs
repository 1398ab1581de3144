//! Builtin transform and email-builder registrations.
//!
//! Streams whose extraction output is already load-shaped use the
//! `passthrough` transform; `plain_report` composes a plain-text email with
//! every input record attached. Anything richer is registered by the
//! embedding application before the runner starts.

use std::collections::BTreeMap;

use databridge_core::StreamData;
use databridge_delivery::render::{file_name_for, render_record};
use databridge_pipeline::{Attachment, EmailMessage, FunctionRegistry, TransformError};
use serde_json::Value;

/// Register the builtin functions on `functions`.
pub fn register(functions: &mut FunctionRegistry) {
    functions.register_transform("passthrough", |data: BTreeMap<String, StreamData>| Ok(data));
    functions.register_email_builder("plain_report", plain_report);
}

/// Subject and body from `email_params` (with plain defaults), one
/// attachment per input record.
fn plain_report(
    data: &BTreeMap<String, &StreamData>,
    params: &BTreeMap<String, Value>,
) -> Result<EmailMessage, TransformError> {
    let subject = params
        .get("subject")
        .and_then(Value::as_str)
        .unwrap_or("databridge report")
        .to_string();
    let body = match params.get("body").and_then(Value::as_str) {
        Some(body) => body.to_string(),
        None => {
            let names: Vec<&str> = data.keys().map(String::as_str).collect();
            format!("Attached: {}", names.join(", "))
        }
    };

    let mut attachments = Vec::with_capacity(data.len());
    for (name, &record) in data {
        let content = render_record(name, record).map_err(|e| TransformError::new(e.to_string()))?;
        attachments.push(Attachment {
            file_name: file_name_for(name, record).to_string(),
            content,
        });
    }

    Ok(EmailMessage {
        subject,
        body,
        attachments,
    })
}
