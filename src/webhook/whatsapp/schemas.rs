//! # WhatsApp Webhook Schemas
//!
//! Data structures for the JSON envelope WhatsApp posts when webhook events
//! occur (incoming messages, delivery status updates).
//!
//! The provider adds fields and event subtypes over time, so decoding is
//! permissive:
//! - every sequence is present-or-empty (absent, `null` or non-array values
//!   decode as an empty `Vec`)
//! - elements of a sequence are decoded one by one and an undecodable
//!   element is dropped without affecting its siblings
//! - unknown message types and statuses decode to an `Unknown` variant
//!   carrying the raw tag

use super::errors::DispatchError;
use crate::consts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, de::DeserializeOwned, de::Error as _};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

/// Deserializes a sequence as present-or-empty, dropping undecodable elements.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Array(items)) => items,
        None | Some(JsonValue::Null) => return Ok(Vec::new()),
        Some(other) => {
            warn!(
                "expected an array of {}, got {other}; treating it as empty",
                std::any::type_name::<T>()
            );
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<T>(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(
                    "dropping undecodable {} at index {index}: {e}",
                    std::any::type_name::<T>()
                );
                None
            }
        })
        .collect())
}

/// Root webhook payload from WhatsApp
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    /// The object type, "whatsapp_business_account" for this integration
    pub object: String,
    /// Entries with the actual data, one per business account
    #[serde(default, deserialize_with = "lenient_seq")]
    pub entry: Vec<Entry>,
}

impl EventEnvelope {
    /// Decodes a raw JSON body into an envelope.
    ///
    /// Fails with [`DispatchError::UnknownObjectType`] when `object` is
    /// missing or belongs to another product routed to the same endpoint.
    pub fn decode(body: JsonValue) -> Result<Self, DispatchError> {
        match body.get("object").and_then(JsonValue::as_str) {
            Some(consts::WHATSAPP_OBJECT) => {}
            Some(other) => return Err(DispatchError::UnknownObjectType(other.to_string())),
            None => return Err(DispatchError::UnknownObjectType(String::new())),
        }

        serde_json::from_value(body).map_err(|e| DispatchError::MalformedEnvelope(e.to_string()))
    }
}

/// Entry object containing the changes of one business account
#[derive(Debug, Deserialize)]
pub struct Entry {
    /// Business Account ID
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub changes: Vec<Change>,
}

/// A change notification for one subscribed field.
///
/// `value` is kept raw: its shape depends on `field` and only the
/// `messages` field is decoded, through [`Change::messages_value`].
#[derive(Debug, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: JsonValue,
}

impl Change {
    /// Decodes the value of a `messages` change, `None` for any other field.
    pub fn messages_value(&self) -> Option<Result<ChangeValue, serde_json::Error>> {
        (self.field == consts::MESSAGES_FIELD).then(|| ChangeValue::deserialize(&self.value))
    }
}

/// Value of a `messages` change: inbound messages and/or delivery statuses
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangeValue {
    /// Messaging product (e.g., "whatsapp")
    pub messaging_product: String,
    pub metadata: Metadata,
    /// Profiles of the message senders
    #[serde(deserialize_with = "lenient_seq")]
    pub contacts: Vec<Contact>,
    #[serde(deserialize_with = "lenient_seq")]
    pub messages: Vec<Message>,
    /// Status updates for messages sent by the business
    #[serde(deserialize_with = "lenient_seq")]
    pub statuses: Vec<Status>,
}

impl ChangeValue {
    /// Profile name of the contact who sent a message from `wa_id`
    pub fn sender_name(&self, wa_id: &str) -> Option<&str> {
        self.contacts
            .iter()
            .find(|contact| contact.wa_id == wa_id)
            .map(|contact| contact.profile.name.as_str())
    }
}

/// Metadata about the WhatsApp Business phone number
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub display_phone_number: String,
    pub phone_number_id: String,
}

/// Contact information for the message sender
#[derive(Debug, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub profile: Profile,
    /// WhatsApp ID (phone number)
    pub wa_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
}

/// Back-reference from a reply to the message it answers
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageContext {
    /// Sender of the referenced message
    #[serde(default)]
    pub from: String,
    /// ID of the referenced message
    pub id: String,
}

/// Inbound message, discriminated by its `type` tag
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawMessage")]
pub struct Message {
    /// Sender's WhatsApp ID (phone number)
    pub from: String,
    pub id: String,
    /// Unix timestamp in seconds, as sent by the provider
    pub timestamp: String,
    pub context: Option<MessageContext>,
    pub kind: MessageKind,
}

impl Message {
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        parse_unix_timestamp(&self.timestamp)
    }
}

/// Type-specific content of a message.
///
/// Supporting a new provider type is one variant here plus one arm in
/// [`MessageKind::decode`].
///
/// Only text, image and document payloads are required. The receipt-only
/// types keep whatever payload decodes and are routed on their tag alone.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Text(TextContent),
    Image(MediaContent),
    Document(DocumentContent),
    Audio(Option<MediaContent>),
    Video(Option<MediaContent>),
    Sticker(Option<MediaContent>),
    Location(Option<LocationContent>),
    /// Shared contact cards, kept undecoded
    Contacts(Vec<JsonValue>),
    /// A type this receiver does not know, with its raw tag
    Unknown(String),
}

impl MessageKind {
    /// Decodes the payload stored under the key named after the type tag.
    fn decode(tag: &str, payload: Option<JsonValue>) -> Result<Self, serde_json::Error> {
        Ok(match tag {
            "text" => Self::Text(type_payload(tag, payload)?),
            "image" => Self::Image(type_payload(tag, payload)?),
            "document" => Self::Document(type_payload(tag, payload)?),
            "audio" => Self::Audio(optional_payload(tag, payload)),
            "video" => Self::Video(optional_payload(tag, payload)),
            "sticker" => Self::Sticker(optional_payload(tag, payload)),
            "location" => Self::Location(optional_payload(tag, payload)),
            "contacts" => Self::Contacts(match payload {
                Some(JsonValue::Array(cards)) => cards,
                Some(card @ JsonValue::Object(_)) => vec![card],
                _ => Vec::new(),
            }),
            _ => Self::Unknown(tag.to_string()),
        })
    }

    /// The provider's `type` tag for this content
    pub fn tag(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Document(_) => "document",
            Self::Audio(_) => "audio",
            Self::Video(_) => "video",
            Self::Sticker(_) => "sticker",
            Self::Location(_) => "location",
            Self::Contacts(_) => "contacts",
            Self::Unknown(tag) => tag,
        }
    }
}

fn type_payload<T: DeserializeOwned>(
    tag: &str,
    payload: Option<JsonValue>,
) -> Result<T, serde_json::Error> {
    match payload {
        Some(value) => serde_json::from_value(value),
        None => Err(serde_json::Error::custom(format!(
            "`{tag}` message without a `{tag}` payload"
        ))),
    }
}

/// Decodes a payload that is not needed for routing, `None` when it is
/// missing or has an unexpected shape.
fn optional_payload<T: DeserializeOwned>(tag: &str, payload: Option<JsonValue>) -> Option<T> {
    match serde_json::from_value(payload?) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("ignoring unexpected `{tag}` payload: {e}");
            None
        }
    }
}

/// Wire shape of a message before its payload is resolved from the type tag
#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    from: String,
    id: String,
    #[serde(default)]
    timestamp: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    context: Option<JsonValue>,
    #[serde(flatten)]
    payloads: Map<String, JsonValue>,
}

impl TryFrom<RawMessage> for Message {
    type Error = serde_json::Error;

    fn try_from(mut raw: RawMessage) -> Result<Self, Self::Error> {
        let payload = raw.payloads.remove(&raw.kind);
        let kind = MessageKind::decode(&raw.kind, payload)?;

        // a malformed back-reference is dropped, not the message
        let context = raw.context.filter(|value| !value.is_null()).and_then(|value| {
            serde_json::from_value(value)
                .inspect_err(|e| warn!(message_id = %raw.id, "ignoring malformed context: {e}"))
                .ok()
        });

        Ok(Self {
            from: raw.from,
            id: raw.id,
            timestamp: raw.timestamp,
            context,
            kind,
        })
    }
}

/// Text message content
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextContent {
    pub body: String,
}

/// Media content (image, audio, video, sticker)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaContent {
    /// Media ID, used to download the content from the provider
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// SHA256 hash of the media
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentContent {
    #[serde(flatten)]
    pub media: MediaContent,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationContent {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Status update for a message sent by the business
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawStatus")]
pub struct Status {
    /// ID of the message this status describes
    pub id: String,
    pub recipient_id: String,
    pub timestamp: String,
    pub conversation: Option<Conversation>,
    pub pricing: Option<Pricing>,
    pub kind: StatusKind,
}

impl Status {
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        parse_unix_timestamp(&self.timestamp)
    }
}

/// Delivery state carried by a status update
#[derive(Debug, Clone, PartialEq)]
pub enum StatusKind {
    Sent,
    Delivered,
    Read,
    /// Delivery failed, with the provider's error records
    Failed(Vec<StatusError>),
    Unknown(String),
}

impl StatusKind {
    fn decode(tag: &str, errors: Vec<StatusError>) -> Self {
        match tag {
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            "failed" => Self::Failed(errors),
            _ => Self::Unknown(tag.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed(_) => "failed",
            Self::Unknown(tag) => tag,
        }
    }
}

#[derive(Deserialize)]
struct RawStatus {
    id: String,
    #[serde(default)]
    recipient_id: String,
    #[serde(default)]
    timestamp: String,
    status: String,
    #[serde(default)]
    conversation: Option<Conversation>,
    #[serde(default)]
    pricing: Option<Pricing>,
    #[serde(default, deserialize_with = "lenient_seq")]
    errors: Vec<StatusError>,
}

impl From<RawStatus> for Status {
    fn from(raw: RawStatus) -> Self {
        Self {
            kind: StatusKind::decode(&raw.status, raw.errors),
            id: raw.id,
            recipient_id: raw.recipient_id,
            timestamp: raw.timestamp,
            conversation: raw.conversation,
            pricing: raw.pricing,
        }
    }
}

/// Error record attached to a failed status
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusError {
    pub code: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_data: Option<ErrorData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorData {
    pub details: String,
}

/// Conversation the status was billed under
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub origin: Option<ConversationOrigin>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationOrigin {
    #[serde(rename = "type")]
    pub origin_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub billable: bool,
    #[serde(default)]
    pub pricing_model: String,
    #[serde(default)]
    pub category: String,
}

fn parse_unix_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    timestamp
        .parse::<i64>()
        .ok()
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
}
