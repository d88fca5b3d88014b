use opentelemetry::{KeyValue, metrics::UpDownCounter};
use std::sync::LazyLock;

static EVENTS: LazyLock<UpDownCounter<i64>> = LazyLock::new(|| {
    logfire::i64_up_down_counter("whatsapp_webhook_events")
        .with_description("WhatsApp webhook events routed")
        .with_unit("event")
        .build()
});

fn incr_events(metric: String, value: String) {
    EVENTS.add(1, &[KeyValue::new(metric, value)]);
}

pub fn incr_message_type_events(message_type: &str) {
    incr_events("message_type".to_string(), message_type.into())
}

pub fn incr_delivery_status_events(status: &str) {
    incr_events("delivery_status".to_string(), status.into())
}
