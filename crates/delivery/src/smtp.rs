//! SMTP delivery via the `lettre` async transport.
//!
//! The loader hands this adapter a fully composed [`EmailEnvelope`]; the
//! adapter's job is MIME assembly and transport. The sender is the
//! destination's `default_sender`. District relays speak plain SMTP on
//! their internal network, so the transport connects without TLS and adds
//! credentials only when the destination carries them.

use async_trait::async_trait;
use databridge_core::DestConfig;
use databridge_pipeline::{
    AdapterError, EmailEnvelope, LoadAdapter, LoadContext, LoadReceipt,
};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::DeliveryError;

/// Sends composed email envelopes through an SMTP relay.
#[derive(Debug, Default)]
pub struct SmtpDelivery;

impl SmtpDelivery {
    /// Create the adapter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LoadAdapter for SmtpDelivery {
    async fn load(&self, ctx: LoadContext<'_>) -> Result<LoadReceipt, AdapterError> {
        let DestConfig::Smtp {
            host,
            port,
            user,
            password,
            default_sender,
        } = ctx.dest
        else {
            return Err(AdapterError::Protocol(
                "smtp adapter dispatched with a non-smtp destination".to_string(),
            ));
        };
        let Some(envelope) = &ctx.email else {
            return Err(AdapterError::Protocol(
                "smtp loading requires a composed email".to_string(),
            ));
        };

        let message = build_message(default_sender, envelope)?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(*port);
        if let (Some(user), Some(password)) = (user, password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        let mailer = builder.build();
        mailer
            .send(message)
            .await
            .map_err(DeliveryError::Transport)?;

        tracing::info!(
            stream = %ctx.stream,
            task = %ctx.task,
            recipients = envelope.recipients.len(),
            attachments = envelope.message.attachments.len(),
            subject = %envelope.message.subject,
            "Email sent",
        );

        Ok(LoadReceipt {
            detail: format!(
                "emailed {} recipient(s), {} attachment(s)",
                envelope.recipients.len(),
                envelope.message.attachments.len()
            ),
            records_processed: None,
        })
    }
}

/// Assemble the MIME message: plain-text body, one attachment part per
/// composed attachment.
fn build_message(sender: &str, envelope: &EmailEnvelope) -> Result<Message, DeliveryError> {
    let from: Mailbox = sender.parse().map_err(|_| DeliveryError::Address {
        address: sender.to_string(),
    })?;
    let mut builder = Message::builder()
        .from(from)
        .subject(envelope.message.subject.clone());
    for recipient in &envelope.recipients {
        let to: Mailbox = recipient.parse().map_err(|_| DeliveryError::Address {
            address: recipient.clone(),
        })?;
        builder = builder.to(to);
    }

    let message = if envelope.message.attachments.is_empty() {
        builder
            .header(ContentType::TEXT_PLAIN)
            .body(envelope.message.body.clone())
    } else {
        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(
            envelope.message.body.clone(),
        ));
        for attachment in &envelope.message.attachments {
            parts = parts.singlepart(
                Attachment::new(attachment.file_name.clone())
                    .body(attachment.content.clone(), content_type(&attachment.file_name)),
            );
        }
        builder.multipart(parts)
    };
    message.map_err(|e| DeliveryError::Build(e.to_string()))
}

/// Content type from the attachment's extension; anything unrecognized
/// travels as an opaque byte stream.
fn content_type(file_name: &str) -> ContentType {
    let parsed = match file_name.rsplit('.').next() {
        Some("csv") => ContentType::parse("text/csv"),
        Some("txt") => ContentType::parse("text/plain"),
        Some("json") => ContentType::parse("application/json"),
        _ => ContentType::parse("application/octet-stream"),
    };
    parsed.unwrap_or(ContentType::TEXT_PLAIN)
}
