//! Proxy token derivation and verification
//!
//! A proxy token is `base64url(HMAC-SHA256(issuer_secret, end_user_id))`,
//! padded. It never expires and is never stored: both sides recompute it
//! from the issuer secret and the string form of the end-user identifier.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::SharedError;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of a decoded proxy token
pub const PROXY_TOKEN_LEN: usize = 32;

/// Compute the raw MAC for an end-user identifier
pub fn proxy_mac(issuer_secret: &str, end_user_id: &str) -> Result<[u8; PROXY_TOKEN_LEN], SharedError> {
    let mut mac = HmacSha256::new_from_slice(issuer_secret.as_bytes())
        .map_err(|_| SharedError::HmacInit)?;
    mac.update(end_user_id.as_bytes());

    let mut out = [0u8; PROXY_TOKEN_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Generate the proxy token an end-user presents to join its rooms
pub fn generate_proxy_token(issuer_secret: &str, end_user_id: &str) -> Result<String, SharedError> {
    Ok(URL_SAFE.encode(proxy_mac(issuer_secret, end_user_id)?))
}

/// Decode a presented proxy token back into MAC bytes
pub fn decode_proxy_token(token: &str) -> Result<Vec<u8>, SharedError> {
    URL_SAFE
        .decode(token.as_bytes())
        .map_err(|_| SharedError::MalformedToken)
}

/// Constant-time comparison of a decoded token against the expected MAC
pub fn macs_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        // Keep the work proportional to the presented length
        let dummy = vec![0u8; presented.len()];
        let _ = presented.ct_eq(&dummy);
        return false;
    }

    presented.ct_eq(expected).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &str = "9f1c2d3e-4b5a-6c7d-8e9f-0a1b2c3d4e5f";

    #[test]
    fn test_token_is_deterministic() {
        let a = generate_proxy_token(SECRET, "42").unwrap();
        let b = generate_proxy_token(SECRET, "42").unwrap();
        assert_eq!(a, b);
        // 32 bytes -> 44 padded base64 characters
        assert_eq!(a.len(), 44);
        assert!(a.ends_with('='));
    }

    #[test]
    fn test_token_depends_on_identifier_and_secret() {
        let base = generate_proxy_token(SECRET, "42").unwrap();
        assert_ne!(base, generate_proxy_token(SECRET, "43").unwrap());
        assert_ne!(base, generate_proxy_token("another-secret", "42").unwrap());
    }

    #[test]
    fn test_decode_roundtrip_matches() {
        let token = generate_proxy_token(SECRET, "42").unwrap();
        let decoded = decode_proxy_token(&token).unwrap();
        let expected = proxy_mac(SECRET, "42").unwrap();
        assert!(macs_match(&decoded, &expected));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_proxy_token("***not base64***").is_err());
    }

    #[test]
    fn test_length_mismatch_never_matches() {
        let expected = proxy_mac(SECRET, "42").unwrap();
        assert!(!macs_match(&expected[..16], &expected));
        assert!(!macs_match(&[], &expected));
    }
}
