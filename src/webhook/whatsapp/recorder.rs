//! # Event Recorder
//!
//! The dispatcher decides which branch an event takes; the recorder is the
//! collaborator that performs the branch's action. [`LogRecorder`] writes
//! structured log records and metrics. Storage or notification backends
//! plug in by implementing [`EventRecorder`].

use super::schemas::StatusError;
use crate::metric;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use tracing::info;

#[cfg(test)]
use mockall::automock;

/// Fields shared by every routed inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: String,
    /// Sender's WhatsApp ID (phone number)
    pub from: String,
    /// Sender profile name, when the contact is part of the payload
    pub sender_name: Option<String>,
    /// Business phone number the message was sent to
    pub phone_number_id: String,
    pub received_at: Option<DateTime<Utc>>,
    /// ID of the message this one replies to
    pub reply_to: Option<String>,
}

/// A message routed to one of the handled branches
#[derive(Debug, Clone, PartialEq)]
pub enum MessageEvent {
    Text {
        message: InboundMessage,
        body: String,
    },
    Image {
        message: InboundMessage,
        media_id: String,
        mime_type: Option<String>,
    },
    Document {
        message: InboundMessage,
        media_id: String,
        filename: Option<String>,
    },
    /// Receipt of a message whose payload is left for downstream handling
    Received {
        message: InboundMessage,
        kind: String,
    },
}

impl MessageEvent {
    pub fn message(&self) -> &InboundMessage {
        match self {
            MessageEvent::Text { message, .. }
            | MessageEvent::Image { message, .. }
            | MessageEvent::Document { message, .. }
            | MessageEvent::Received { message, .. } => message,
        }
    }

    /// Message type tag of the routed message
    pub fn kind(&self) -> &str {
        match self {
            MessageEvent::Text { .. } => "text",
            MessageEvent::Image { .. } => "image",
            MessageEvent::Document { .. } => "document",
            MessageEvent::Received { kind, .. } => kind,
        }
    }
}

/// Delivery state of a message sent by the business
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    #[display("sent")]
    Sent,
    #[display("delivered")]
    Delivered,
    #[display("read")]
    Read,
    #[display("failed")]
    Failed,
}

/// A status update routed to one of the handled branches
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    /// ID of the message the status describes
    pub message_id: String,
    pub recipient_id: String,
    pub state: DeliveryState,
    pub updated_at: Option<DateTime<Utc>>,
    /// Error records, only non-empty for failed deliveries
    pub errors: Vec<StatusError>,
}

/// Destination of routed webhook events.
///
/// An `Err` is logged by the dispatcher with the event's context and the
/// remaining events of the payload are still routed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record_message(&self, event: MessageEvent) -> anyhow::Result<()>;

    async fn record_status(&self, event: StatusEvent) -> anyhow::Result<()>;
}

pub type ImplEventRecorder = Box<dyn EventRecorder>;

/// Records events as structured log lines and metric increments
pub struct LogRecorder;

#[async_trait]
impl EventRecorder for LogRecorder {
    async fn record_message(&self, event: MessageEvent) -> anyhow::Result<()> {
        let message = event.message();
        let sender = message.sender_name.as_deref().unwrap_or("unknown");

        match &event {
            MessageEvent::Text { body, .. } => info!(
                message_id = %message.id,
                from = %message.from,
                "text message from {sender}: {body}"
            ),
            MessageEvent::Image {
                media_id,
                mime_type,
                ..
            } => info!(
                message_id = %message.id,
                from = %message.from,
                mime_type = mime_type.as_deref().unwrap_or_default(),
                "image message from {sender}, media id {media_id}"
            ),
            MessageEvent::Document {
                media_id, filename, ..
            } => info!(
                message_id = %message.id,
                from = %message.from,
                filename = filename.as_deref().unwrap_or_default(),
                "document message from {sender}, media id {media_id}"
            ),
            MessageEvent::Received { kind, .. } => info!(
                message_id = %message.id,
                from = %message.from,
                "received {kind} message from {sender}"
            ),
        }

        metric::incr_message_type_events(event.kind());
        Ok(())
    }

    async fn record_status(&self, event: StatusEvent) -> anyhow::Result<()> {
        info!(
            message_id = %event.message_id,
            recipient_id = %event.recipient_id,
            "message status: {}",
            event.state
        );

        metric::incr_delivery_status_events(&event.state.to_string());
        Ok(())
    }
}
