use {
    chatbridge_keys::KeyStore,
    chatbridge_protocol::ChannelName,
    secrecy::{ExposeSecret, SecretString},
};

use crate::error::ApiError;

/// Credentials shorter than this count as not supplied.
const MIN_KEY_LEN: usize = 2;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

fn supplied(key: Option<&str>) -> Option<&str> {
    key.filter(|k| k.len() >= MIN_KEY_LEN)
}

// ── Gates ────────────────────────────────────────────────────────────────────

/// Gate for key management: the supplied key must equal the configured one.
pub fn authorize_admin(expected: &SecretString, given: Option<&str>) -> Result<(), ApiError> {
    let Some(given) = supplied(given) else {
        return Err(ApiError::MissingAdminKey);
    };
    if !safe_equal(given, expected.expose_secret()) {
        return Err(ApiError::WrongAdminKey);
    }
    Ok(())
}

/// Gate for clients: resolve the supplied key to its channel.
pub fn authorize_client(keys: &KeyStore, given: Option<&str>) -> Result<ChannelName, ApiError> {
    let Some(given) = supplied(given) else {
        return Err(ApiError::MissingClientKey);
    };
    keys.lookup(given).ok_or(ApiError::WrongClientKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_equal_compares_content_and_length() {
        assert!(safe_equal("secret", "secret"));
        assert!(!safe_equal("secret", "secreT"));
        assert!(!safe_equal("secret", "secret2"));
        assert!(safe_equal("", ""));
    }

    #[test]
    fn admin_gate() {
        let expected = SecretString::new("hunter22".into());
        assert!(authorize_admin(&expected, Some("hunter22")).is_ok());
        assert!(matches!(
            authorize_admin(&expected, Some("hunter2")),
            Err(ApiError::WrongAdminKey)
        ));
        assert!(matches!(
            authorize_admin(&expected, None),
            Err(ApiError::MissingAdminKey)
        ));
        assert!(matches!(
            authorize_admin(&expected, Some("h")),
            Err(ApiError::MissingAdminKey)
        ));
    }

    #[test]
    fn client_gate() {
        let dir = tempfile::tempdir().unwrap();
        let mut keys = KeyStore::load(dir.path().join("keys.json")).unwrap();
        let key = keys.issue("SomeStreamer").unwrap();

        assert_eq!(
            authorize_client(&keys, Some(&key)).unwrap(),
            ChannelName::new("somestreamer")
        );
        assert!(matches!(
            authorize_client(&keys, Some("unknown-key")),
            Err(ApiError::WrongClientKey)
        ));
        assert!(matches!(
            authorize_client(&keys, Some("x")),
            Err(ApiError::MissingClientKey)
        ));
        assert!(matches!(
            authorize_client(&keys, None),
            Err(ApiError::MissingClientKey)
        ));
    }
}
