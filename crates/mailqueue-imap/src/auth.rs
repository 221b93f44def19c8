//! SASL XOAUTH2 encoding.
//!
//! The initial response is `user=<user>\x01auth=Bearer <token>\x01\x01`,
//! base64 encoded. When the server rejects the token it sends a base64 JSON
//! challenge, which the client answers with an empty line before the tagged
//! NO arrives.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Builds the base64 XOAUTH2 initial response.
///
/// # Errors
///
/// Returns [`Error::Validation`] if either part is empty or contains a
/// control byte that would break the SASL framing.
pub fn xoauth2_response(user: &str, token: &str) -> Result<String> {
    for (name, value) in [("user", user), ("token", token)] {
        if value.is_empty() {
            return Err(Error::Validation(format!("missing XOAUTH2 {name}")));
        }
        if value.bytes().any(|b| b.is_ascii_control()) {
            return Err(Error::Validation(format!(
                "XOAUTH2 {name} contains control characters"
            )));
        }
    }
    let payload = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    Ok(STANDARD.encode(payload.as_bytes()))
}

/// Decodes the server's error challenge for logging.
///
/// Returns `None` if the challenge is not base64 UTF-8.
#[must_use]
pub fn decode_challenge(challenge: &str) -> Option<String> {
    let bytes = STANDARD.decode(challenge.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_xoauth2_payload() {
        let encoded = xoauth2_response("user@example.com", "ya29.token").unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(
            decoded,
            b"user=user@example.com\x01auth=Bearer ya29.token\x01\x01"
        );
    }

    #[test]
    fn test_xoauth2_rejects_missing_token() {
        assert!(matches!(
            xoauth2_response("user@example.com", ""),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_xoauth2_rejects_crlf() {
        assert!(xoauth2_response("user\r\n", "token").is_err());
    }

    #[test]
    fn test_decode_challenge() {
        let json = r#"{"status":"401","schemes":"bearer"}"#;
        let challenge = STANDARD.encode(json);
        assert_eq!(decode_challenge(&challenge).unwrap(), json);
        assert!(decode_challenge("not base64!").is_none());
    }
}
