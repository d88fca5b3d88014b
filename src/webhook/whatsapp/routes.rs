//! WhatsApp webhook endpoint handlers
//!
//! This module handles incoming webhook requests from WhatsApp Business API.
//! It implements both the verification endpoint (GET) and the webhook receiver (POST).
//!
//! # Security
//!
//! When an app secret is configured, the POST endpoint rejects bodies whose
//! `X-Hub-Signature-256` header does not match, see [`super::security`].

use super::{errors::WebhookError, handler, security};
use crate::{consts, server::AppState};
use ntex::{util::Bytes, web};
use serde::Deserialize;
use tracing::{debug, info};

/// Query parameters for webhook verification
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    /// The mode parameter, should be "subscribe"
    #[serde(rename = "hub.mode", default)]
    pub mode: String,
    /// The verification token from WhatsApp
    #[serde(rename = "hub.verify_token", default)]
    pub verify_token: String,
    /// The challenge string to echo back
    #[serde(rename = "hub.challenge", default)]
    pub challenge: String,
}

/// Webhook verification endpoint (GET)
///
/// WhatsApp sends a GET request to verify the webhook URL.
/// This endpoint validates the verify token and returns the challenge.
///
/// # Returns
/// - 200 with the challenge as plain text if verification succeeds
/// - 400 if `hub.mode` is not "subscribe"
/// - 403 if the verify token does not match
#[web::get("")]
pub async fn verify(
    query: web::types::Query<VerifyQuery>,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    info!("webhook verification attempt, mode: {}", query.mode);

    let challenge = app_state
        .verifier
        .verify(&query.mode, &query.verify_token, &query.challenge)?;

    info!("webhook verified successfully");

    Ok(web::HttpResponse::Ok()
        .content_type("text/plain")
        .body(challenge))
}

/// Webhook receiver endpoint (POST)
///
/// Receives webhook events from WhatsApp Business API.
///
/// # Processing
///
/// WhatsApp retries deliveries that are not acknowledged quickly, so the
/// payload is dispatched on a background task and 200 is returned without
/// waiting for it. Routing problems are logged, never reported back.
///
/// # Returns
/// - 200 `{"status":"ok"}` once the payload is handed to the dispatcher
/// - 400 if the body is not JSON
/// - 401 if the payload signature does not match the configured app secret
#[web::post("")]
pub async fn receive(
    req: web::HttpRequest,
    body: Bytes,
    app_state: web::types::State<AppState>,
) -> Result<impl web::Responder, web::Error> {
    if let Some(app_secret) = app_state.app_secret.as_deref() {
        let signature = req
            .headers()
            .get(consts::SIGNATURE_HEADER)
            .and_then(|header_value| header_value.to_str().ok())
            .unwrap_or_default();

        if !security::verify_signature(signature, &body, app_secret) {
            return Err(WebhookError::InvalidSignature.into());
        }
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

    debug!("webhook event received: {payload}");

    handler::spawn_dispatch(app_state.dispatcher.clone(), payload);

    Ok(web::HttpResponse::Ok().json(&serde_json::json!({
        "status": "ok"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::{
        self,
        whatsapp::{
            dedupe::RedeliveryGuard,
            handler::Dispatcher,
            recorder::{DeliveryState, EventRecorder, MessageEvent, StatusEvent},
            verification::Verifier,
        },
    };
    use async_trait::async_trait;
    use ntex::{http, web::test};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::{Notify, mpsc};

    const VERIFY_TOKEN: &str = "verify-me";
    const APP_SECRET: &str = "app-secret";

    #[derive(Debug)]
    enum Recorded {
        Message(MessageEvent),
        Status(StatusEvent),
    }

    /// Forwards routed events to a channel, optionally waiting on a gate first
    struct ChannelRecorder {
        gate: Option<Arc<Notify>>,
        events: mpsc::UnboundedSender<Recorded>,
    }

    impl ChannelRecorder {
        async fn forward(&self, recorded: Recorded) -> anyhow::Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.events
                .send(recorded)
                .map_err(|_| anyhow::anyhow!("test receiver dropped"))
        }
    }

    #[async_trait]
    impl EventRecorder for ChannelRecorder {
        async fn record_message(&self, event: MessageEvent) -> anyhow::Result<()> {
            self.forward(Recorded::Message(event)).await
        }

        async fn record_status(&self, event: StatusEvent) -> anyhow::Result<()> {
            self.forward(Recorded::Status(event)).await
        }
    }

    fn app_state(recorder: ChannelRecorder, app_secret: Option<&str>) -> AppState {
        AppState {
            verifier: Verifier::new(VERIFY_TOKEN),
            dispatcher: Arc::new(Dispatcher::new(
                Box::new(recorder),
                RedeliveryGuard::disabled(),
            )),
            app_secret: app_secret.map(str::to_string),
        }
    }

    fn recorder(gate: Option<Arc<Notify>>) -> (ChannelRecorder, mpsc::UnboundedReceiver<Recorded>) {
        let (events, rx) = mpsc::unbounded_channel();
        (ChannelRecorder { gate, events }, rx)
    }

    fn text_envelope(body: &str) -> serde_json::Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{"id": "1", "changes": [{"field": "messages", "value": {
                "messaging_product": "whatsapp",
                "metadata": {"display_phone_number": "15550001111", "phone_number_id": "pn1"},
                "messages": [{"from": "111", "id": "m1", "timestamp": "0", "type": "text",
                              "text": {"body": body}}],
            }}]}],
        })
    }

    fn post_json(payload: &serde_json::Value) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/webhook")
            .header("content-type", "application/json")
            .set_payload(payload.to_string())
    }

    #[test]
    fn test_verify_query_deserialization() {
        let json = r#"{"hub.mode":"subscribe","hub.verify_token":"test123","hub.challenge":"challenge123"}"#;
        let query: VerifyQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.mode, "subscribe");
        assert_eq!(query.verify_token, "test123");
        assert_eq!(query.challenge, "challenge123");

        let query: VerifyQuery = serde_json::from_str("{}").unwrap();
        assert!(query.mode.is_empty() && query.verify_token.is_empty());
    }

    #[ntex::test]
    async fn test_verify_echoes_challenge() {
        let (recorder, _rx) = recorder(None);
        let app = test::init_service(
            web::App::new()
                .state(app_state(recorder, None))
                .configure(webhook::routes::whatsapp),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=xyz123")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), http::StatusCode::OK);
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"xyz123");
    }

    #[ntex::test]
    async fn test_verify_wrong_token_is_forbidden() {
        let (recorder, _rx) = recorder(None);
        let app = test::init_service(
            web::App::new()
                .state(app_state(recorder, None))
                .configure(webhook::routes::whatsapp),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=xyz123")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), http::StatusCode::FORBIDDEN);
        let body = test::read_body(resp).await;
        assert_ne!(&body[..], b"xyz123");
    }

    #[ntex::test]
    async fn test_verify_bad_mode_is_bad_request() {
        let (recorder, _rx) = recorder(None);
        let app = test::init_service(
            web::App::new()
                .state(app_state(recorder, None))
                .configure(webhook::routes::whatsapp),
        )
        .await;

        for uri in [
            "/webhook?hub.mode=unsubscribe&hub.verify_token=verify-me&hub.challenge=xyz123",
            "/webhook?hub.verify_token=verify-me&hub.challenge=xyz123",
            "/webhook",
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[ntex::test]
    async fn test_receive_acknowledges_before_processing() {
        let gate = Arc::new(Notify::new());
        let (recorder, mut rx) = recorder(Some(gate.clone()));
        let app = test::init_service(
            web::App::new()
                .state(app_state(recorder, None))
                .configure(webhook::routes::whatsapp),
        )
        .await;

        let resp = test::call_service(&app, post_json(&text_envelope("hi")).to_request()).await;

        assert_eq!(resp.status(), http::StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(body, json!({"status": "ok"}));
        assert!(rx.try_recv().is_err());

        gate.notify_one();
        match rx.recv().await {
            Some(Recorded::Message(MessageEvent::Text { message, body })) => {
                assert_eq!(body, "hi");
                assert_eq!(message.id, "m1");
            }
            other => panic!("expected a text message, got {other:?}"),
        }
    }

    #[ntex::test]
    async fn test_receive_other_product_routes_nothing() {
        let (recorder, mut rx) = recorder(None);
        let app = test::init_service(
            web::App::new()
                .state(app_state(recorder, None))
                .configure(webhook::routes::whatsapp),
        )
        .await;

        let mut other = text_envelope("ignored");
        other["object"] = json!("other_product");
        let resp = test::call_service(&app, post_json(&other).to_request()).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(body, json!({"status": "ok"}));

        // the marker payload is dispatched after the ignored one
        let resp = test::call_service(&app, post_json(&text_envelope("marker")).to_request()).await;
        assert_eq!(resp.status(), http::StatusCode::OK);

        match rx.recv().await {
            Some(Recorded::Message(MessageEvent::Text { body, .. })) => assert_eq!(body, "marker"),
            other => panic!("expected the marker message, got {other:?}"),
        }
    }

    #[ntex::test]
    async fn test_receive_failed_status() {
        let (recorder, mut rx) = recorder(None);
        let app = test::init_service(
            web::App::new()
                .state(app_state(recorder, None))
                .configure(webhook::routes::whatsapp),
        )
        .await;

        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{"id": "1", "changes": [{"field": "messages", "value": {
                "messaging_product": "whatsapp",
                "metadata": {"display_phone_number": "15550001111", "phone_number_id": "pn1"},
                "statuses": [{"id": "m1", "status": "failed", "timestamp": "0", "recipient_id": "111",
                              "errors": [{"code": 131047, "title": "Re-engagement message",
                                          "message": "More than 24 hours have passed"}]}],
            }}]}],
        });
        let resp = test::call_service(&app, post_json(&payload).to_request()).await;
        assert_eq!(resp.status(), http::StatusCode::OK);

        match rx.recv().await {
            Some(Recorded::Status(event)) => {
                assert_eq!(event.state, DeliveryState::Failed);
                assert_eq!(event.message_id, "m1");
                assert_eq!(event.errors.len(), 1);
                assert_eq!(event.errors[0].code, 131047);
            }
            other => panic!("expected a failed status, got {other:?}"),
        }
    }

    #[ntex::test]
    async fn test_receive_malformed_json_is_bad_request() {
        let (recorder, _rx) = recorder(None);
        let app = test::init_service(
            web::App::new()
                .state(app_state(recorder, None))
                .configure(webhook::routes::whatsapp),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook")
            .header("content-type", "application/json")
            .set_payload("{\"object\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
    }

    #[ntex::test]
    async fn test_receive_checks_signature_when_secret_configured() {
        let (recorder, mut rx) = recorder(None);
        let app = test::init_service(
            web::App::new()
                .state(app_state(recorder, Some(APP_SECRET)))
                .configure(webhook::routes::whatsapp),
        )
        .await;

        let unsigned =
            test::call_service(&app, post_json(&text_envelope("unsigned")).to_request()).await;
        assert_eq!(unsigned.status(), http::StatusCode::UNAUTHORIZED);

        let forged = text_envelope("forged");
        let req = post_json(&forged)
            .header(
                consts::SIGNATURE_HEADER,
                security::signature_header(forged.to_string().as_bytes(), "wrong-secret"),
            )
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), http::StatusCode::UNAUTHORIZED);

        let signed = text_envelope("signed");
        let req = post_json(&signed)
            .header(
                consts::SIGNATURE_HEADER,
                security::signature_header(signed.to_string().as_bytes(), APP_SECRET),
            )
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), http::StatusCode::OK);

        // only the signed delivery was dispatched
        match rx.recv().await {
            Some(Recorded::Message(MessageEvent::Text { body, .. })) => assert_eq!(body, "signed"),
            other => panic!("expected the signed message, got {other:?}"),
        }
    }
}
