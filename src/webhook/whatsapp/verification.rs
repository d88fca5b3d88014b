//! Subscription handshake.
//!
//! When the webhook URL is registered, the provider sends a GET with
//! `hub.mode`, `hub.verify_token` and `hub.challenge`. Echoing the challenge
//! back proves that this endpoint knows the configured verify token.

use super::errors::VerificationError;
use crate::consts;
use subtle::ConstantTimeEq;

/// Checks a handshake request against the expected verify token.
///
/// Returns the challenge unchanged on success. The mode is checked before
/// the token, so a bad mode is reported even when the token is also wrong.
pub fn verify(
    mode: &str,
    token: &str,
    challenge: &str,
    expected_token: &str,
) -> Result<String, VerificationError> {
    if mode != consts::SUBSCRIBE_MODE {
        return Err(VerificationError::InvalidMode);
    }

    let token_matches: bool = token.as_bytes().ct_eq(expected_token.as_bytes()).into();
    if !token_matches {
        return Err(VerificationError::TokenMismatch);
    }

    Ok(challenge.to_string())
}

/// Handshake verifier holding the verify token loaded at startup
#[derive(Clone)]
pub struct Verifier {
    expected_token: String,
}

impl Verifier {
    pub fn new(expected_token: impl Into<String>) -> Self {
        Self {
            expected_token: expected_token.into(),
        }
    }

    pub fn verify(
        &self,
        mode: &str,
        token: &str,
        challenge: &str,
    ) -> Result<String, VerificationError> {
        verify(mode, token, challenge, &self.expected_token)
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("expected_token", &"<redacted>")
            .finish()
    }
}
