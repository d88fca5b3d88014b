//! Payload signature verification for WhatsApp webhook deliveries.
//!
//! Meta signs every webhook payload with HMAC-SHA256 keyed by the app
//! secret and sends it as `X-Hub-Signature-256: sha256=<hex_signature>`.
//!
//! - The signature covers the raw request body bytes, not re-serialized JSON
//! - The comparison is constant-time
//!
//! The check only runs when an app secret is configured.

use crate::consts;
use hmac::{Hmac, Mac, digest::InvalidLength};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{error, warn};

type HmacSha256 = Hmac<Sha256>;

/// Verifies the `X-Hub-Signature-256` header value against the raw body.
///
/// Returns `false` for a malformed header as well as for a wrong signature.
pub fn verify_signature(signature_header: &str, payload: &[u8], app_secret: &str) -> bool {
    let Some(signature_hex) = signature_header.strip_prefix(consts::SIGNATURE_PREFIX) else {
        warn!("signature header without the `sha256=` prefix");
        return false;
    };

    let received = match hex::decode(signature_hex) {
        Ok(signature) => signature,
        Err(e) => {
            warn!("signature header is not valid hex: {e}");
            return false;
        }
    };

    let computed = match sign(payload, app_secret) {
        Ok(signature) => signature,
        Err(e) => {
            error!("failed to create HMAC instance: {e}");
            return false;
        }
    };

    let is_valid: bool = computed.ct_eq(&received[..]).into();
    if !is_valid {
        warn!("webhook signature does not match the payload");
    }

    is_valid
}

/// HMAC-SHA256 of `payload` keyed by `app_secret`
fn sign(payload: &[u8], app_secret: &str) -> Result<Vec<u8>, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Header value the provider would send for `payload`, used by tests
#[cfg(test)]
pub fn signature_header(payload: &[u8], app_secret: &str) -> String {
    format!("{}{}", consts::SIGNATURE_PREFIX, hex::encode(sign(payload, app_secret).unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"object":"whatsapp_business_account","entry":[]}"#;
    const SECRET: &str = "test_secret";

    #[test]
    fn test_verify_signature_valid() {
        let header = signature_header(PAYLOAD, SECRET);
        assert!(verify_signature(&header, PAYLOAD, SECRET));
    }

    #[test]
    fn test_verify_signature_known_vector() {
        // echo -n 'hello' | openssl dgst -sha256 -hmac key
        let header = "sha256=9307b3b915efb5171ff14d8cb55fbcc798c6c0ef1456d66ded1a6aa723a58b7b";
        assert!(verify_signature(header, b"hello", "key"));
    }

    #[test]
    fn test_verify_signature_wrong_secret() {
        let header = signature_header(PAYLOAD, "wrong_secret");
        assert!(!verify_signature(&header, PAYLOAD, SECRET));
    }

    #[test]
    fn test_verify_signature_tampered_payload() {
        let header = signature_header(PAYLOAD, SECRET);
        let tampered = br#"{"object":"whatsapp_business_account","entry":[{}]}"#;
        assert!(!verify_signature(&header, tampered, SECRET));
    }

    #[test]
    fn test_verify_signature_invalid_header_format() {
        let signature = hex::encode(sign(PAYLOAD, SECRET).unwrap());

        assert!(!verify_signature(&signature, PAYLOAD, SECRET));
        assert!(!verify_signature(&format!("sha1={signature}"), PAYLOAD, SECRET));
        assert!(!verify_signature("", PAYLOAD, SECRET));
    }

    #[test]
    fn test_verify_signature_invalid_hex() {
        assert!(!verify_signature("sha256=zzzzz", PAYLOAD, SECRET));
        assert!(!verify_signature("sha256=abc", PAYLOAD, SECRET));
    }

    #[test]
    fn test_verify_signature_truncated() {
        let header = signature_header(PAYLOAD, SECRET);
        assert!(!verify_signature(&header[..header.len() - 2], PAYLOAD, SECRET));
    }
}
