/// `object` value of envelopes sent for WhatsApp Business accounts.
pub const WHATSAPP_OBJECT: &str = "whatsapp_business_account";
/// Only changes on this field carry messages and statuses.
pub const MESSAGES_FIELD: &str = "messages";
pub const SUBSCRIBE_MODE: &str = "subscribe";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const SIGNATURE_PREFIX: &str = "sha256=";
pub const WEBHOOK_PATH: &str = "/webhook";
