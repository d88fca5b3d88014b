//! Error types of the WhatsApp webhook.
//!
//! [`VerificationError`] and [`WebhookError`] reach the provider as HTTP
//! statuses. [`DispatchError`] never leaves the dispatcher: it is logged and
//! swallowed so one bad event cannot block the ones after it.

use derive_more::{Display, Error};
use ntex::{http, web};
use tracing::warn;

/// Reasons the subscription handshake is refused
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[display("invalid hub.mode")]
    InvalidMode,
    #[display("verify token mismatch")]
    TokenMismatch,
}

impl web::error::WebResponseError for VerificationError {
    fn error_response(&self, _: &web::HttpRequest) -> web::HttpResponse {
        warn!("webhook verification refused: {self}");

        web::HttpResponse::build(self.status_code())
            .content_type("text/plain")
            .body(self.to_string())
    }

    fn status_code(&self) -> http::StatusCode {
        match *self {
            VerificationError::InvalidMode => http::StatusCode::BAD_REQUEST,
            VerificationError::TokenMismatch => http::StatusCode::FORBIDDEN,
        }
    }
}

/// Event deliveries rejected before anything is dispatched
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[display("invalid payload signature")]
    InvalidSignature,
    #[display("malformed payload: {_0}")]
    MalformedPayload(#[error(not(source))] String),
}

impl web::error::WebResponseError for WebhookError {
    fn error_response(&self, _: &web::HttpRequest) -> web::HttpResponse {
        warn!("webhook delivery rejected: {self}");

        web::HttpResponse::build(self.status_code())
            .content_type("text/plain")
            .body(self.to_string())
    }

    fn status_code(&self) -> http::StatusCode {
        match *self {
            WebhookError::InvalidSignature => http::StatusCode::UNAUTHORIZED,
            WebhookError::MalformedPayload(_) => http::StatusCode::BAD_REQUEST,
        }
    }
}

/// Problems found while routing one payload, logged and never returned to the provider
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[display("unknown object type: {_0:?}")]
    UnknownObjectType(#[error(not(source))] String),
    #[display("malformed envelope: {_0}")]
    MalformedEnvelope(#[error(not(source))] String),
    #[display("unhandled {event} subtype: {subtype}")]
    UnhandledEventSubtype {
        event: &'static str,
        subtype: String,
    },
    #[display("recording {event} {id} failed: {reason}")]
    Recorder {
        event: &'static str,
        id: String,
        reason: String,
    },
}
