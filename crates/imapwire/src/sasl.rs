//! SASL initial responses.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Generates the XOAUTH2 initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`, base64 encoded.
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xoauth2_response() {
        let response = xoauth2_response("user@example.com", "token123");
        let decoded = STANDARD.decode(&response).unwrap_or_default();
        assert_eq!(
            decoded,
            b"user=user@example.com\x01auth=Bearer token123\x01\x01"
        );
    }
}
