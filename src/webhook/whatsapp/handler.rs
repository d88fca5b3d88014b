//! # WhatsApp Webhook Handler
//!
//! Walks an event envelope and routes every message and status update to
//! the [`EventRecorder`], one decision per event.
//!
//! # Routing
//!
//! | message type | action |
//! |--------------|--------|
//! | `text` | record the body |
//! | `image`, `document` | record the media id |
//! | `audio`, `video`, `location`, `contacts`, `sticker` | record receipt |
//! | anything else | log as unhandled |
//!
//! | status | action |
//! |--------|--------|
//! | `sent`, `delivered`, `read` | record the transition |
//! | `failed` | log the error records, record the transition |
//! | anything else | log as unhandled |
//!
//! Dispatching never fails: unknown products, undecodable events, recorder
//! errors and recorder panics are logged and the next event is routed.

use super::{
    dedupe::{DedupeKey, RedeliveryGuard},
    errors::DispatchError,
    recorder::{DeliveryState, ImplEventRecorder, InboundMessage, MessageEvent, StatusEvent},
    schemas::{ChangeValue, EventEnvelope, Message, MessageKind, Status, StatusKind},
};
use futures::FutureExt;
use serde_json::Value as JsonValue;
use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc};
use tracing::{debug, error, warn};

/// Outcome counters of one dispatched payload
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub messages_routed: usize,
    pub statuses_routed: usize,
    /// Events whose type or status has no branch
    pub unhandled: usize,
    /// Events skipped as provider redeliveries
    pub duplicates: usize,
    /// Events whose recorder call failed or panicked
    pub failures: usize,
}

impl DispatchReport {
    /// True when nothing was handed to the recorder
    pub fn is_noop(&self) -> bool {
        self.messages_routed == 0 && self.statuses_routed == 0 && self.failures == 0
    }
}

/// Routes webhook payloads to an [`EventRecorder`](super::recorder::EventRecorder)
pub struct Dispatcher {
    recorder: ImplEventRecorder,
    guard: RedeliveryGuard,
}

impl Dispatcher {
    pub fn new(recorder: ImplEventRecorder, guard: RedeliveryGuard) -> Self {
        Self { recorder, guard }
    }

    /// Main webhook processor
    ///
    /// Processes entries, changes, messages and statuses in payload order.
    /// Messages of a change are routed before its statuses.
    pub async fn dispatch(&self, body: JsonValue) -> DispatchReport {
        let mut report = DispatchReport::default();

        let envelope = match EventEnvelope::decode(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("ignoring webhook payload: {e}");
                return report;
            }
        };

        for entry in &envelope.entry {
            for change in &entry.changes {
                let value = match change.messages_value() {
                    Some(Ok(value)) => value,
                    Some(Err(e)) => {
                        warn!(entry_id = %entry.id, "dropping undecodable messages change: {e}");
                        continue;
                    }
                    None => {
                        debug!(entry_id = %entry.id, field = %change.field, "skipping change");
                        continue;
                    }
                };

                for message in &value.messages {
                    self.route_message(message, &value, &mut report).await;
                }
                for status in &value.statuses {
                    self.route_status(status, &mut report).await;
                }
            }
        }

        report
    }

    async fn route_message(
        &self,
        message: &Message,
        value: &ChangeValue,
        report: &mut DispatchReport,
    ) {
        debug!(
            message_id = %message.id,
            "message received from {} (type: {})",
            message.from,
            message.kind.tag()
        );

        let event = match message_event(message, value) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %message.id, "{e}");
                report.unhandled += 1;
                return;
            }
        };

        let key = DedupeKey::message(&message.id);
        if !self.guard.first_delivery(&key) {
            debug!("skipping redelivered {key}");
            report.duplicates += 1;
            return;
        }

        let outcome = catch_panic(async move { self.recorder.record_message(event).await }).await;
        match outcome {
            Ok(()) => report.messages_routed += 1,
            Err(reason) => {
                let e = DispatchError::Recorder {
                    event: "message",
                    id: message.id.clone(),
                    reason,
                };
                error!(kind = message.kind.tag(), "{e}");
                self.guard.forget(&key);
                report.failures += 1;
            }
        }
    }

    async fn route_status(&self, status: &Status, report: &mut DispatchReport) {
        debug!(
            message_id = %status.id,
            "message status: {}",
            status.kind.tag()
        );

        let event = match status_event(status) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %status.id, "{e}");
                report.unhandled += 1;
                return;
            }
        };

        let key = DedupeKey::status(&status.id, status.kind.tag());
        if !self.guard.first_delivery(&key) {
            debug!("skipping redelivered {key}");
            report.duplicates += 1;
            return;
        }

        if let StatusKind::Failed(errors) = &status.kind {
            if errors.is_empty() {
                error!(
                    message_id = %status.id,
                    recipient_id = %status.recipient_id,
                    "message failed"
                );
            }
            for e in errors {
                error!(
                    message_id = %status.id,
                    recipient_id = %status.recipient_id,
                    code = e.code,
                    title = %e.title,
                    "message failed: {}",
                    e.message
                );
            }
        }

        let outcome = catch_panic(async move { self.recorder.record_status(event).await }).await;
        match outcome {
            Ok(()) => report.statuses_routed += 1,
            Err(reason) => {
                let e = DispatchError::Recorder {
                    event: "status",
                    id: status.id.clone(),
                    reason,
                };
                error!(status = status.kind.tag(), "{e}");
                self.guard.forget(&key);
                report.failures += 1;
            }
        }
    }
}

/// Picks the branch of a message, the single decision point for message types
fn message_event(message: &Message, value: &ChangeValue) -> Result<MessageEvent, DispatchError> {
    let inbound = InboundMessage {
        id: message.id.clone(),
        from: message.from.clone(),
        sender_name: value.sender_name(&message.from).map(str::to_string),
        phone_number_id: value.metadata.phone_number_id.clone(),
        received_at: message.received_at(),
        reply_to: message.context.as_ref().map(|context| context.id.clone()),
    };

    match &message.kind {
        MessageKind::Text(text) => Ok(MessageEvent::Text {
            message: inbound,
            body: text.body.clone(),
        }),
        MessageKind::Image(image) => Ok(MessageEvent::Image {
            message: inbound,
            media_id: image.id.clone(),
            mime_type: image.mime_type.clone(),
        }),
        MessageKind::Document(document) => Ok(MessageEvent::Document {
            message: inbound,
            media_id: document.media.id.clone(),
            filename: document.filename.clone(),
        }),
        MessageKind::Audio(_)
        | MessageKind::Video(_)
        | MessageKind::Location(_)
        | MessageKind::Contacts(_)
        | MessageKind::Sticker(_) => Ok(MessageEvent::Received {
            message: inbound,
            kind: message.kind.tag().to_string(),
        }),
        MessageKind::Unknown(tag) => Err(DispatchError::UnhandledEventSubtype {
            event: "message",
            subtype: tag.clone(),
        }),
    }
}

/// Picks the branch of a status update
fn status_event(status: &Status) -> Result<StatusEvent, DispatchError> {
    let (state, errors) = match &status.kind {
        StatusKind::Sent => (DeliveryState::Sent, Vec::new()),
        StatusKind::Delivered => (DeliveryState::Delivered, Vec::new()),
        StatusKind::Read => (DeliveryState::Read, Vec::new()),
        StatusKind::Failed(errors) => (DeliveryState::Failed, errors.clone()),
        StatusKind::Unknown(tag) => {
            return Err(DispatchError::UnhandledEventSubtype {
                event: "status",
                subtype: tag.clone(),
            });
        }
    };

    Ok(StatusEvent {
        message_id: status.id.clone(),
        recipient_id: status.recipient_id.clone(),
        state,
        updated_at: status.updated_at(),
        errors,
    })
}

/// Runs a recorder call, turning both its error and a panic into a reason string
async fn catch_panic<F>(future: F) -> Result<(), String>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Dispatches a payload on a background task without awaiting it.
///
/// The provider expects a quick acknowledgement and retries slow
/// deliveries, so the HTTP handler answers before routing is done.
pub fn spawn_dispatch(dispatcher: Arc<Dispatcher>, body: JsonValue) {
    ntex::rt::spawn(async move {
        match AssertUnwindSafe(dispatcher.dispatch(body)).catch_unwind().await {
            Ok(report) => debug!(?report, "webhook payload dispatched"),
            Err(panic) => error!(
                "webhook dispatch panicked: {}",
                panic_message(panic.as_ref())
            ),
        }
    });
}
