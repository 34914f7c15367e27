//! Session token (JWT) generation and validation

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Clock skew tolerated when checking `exp`, in seconds
const LEEWAY_SECONDS: u64 = 60;

/// Claims carried by a staff session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal (users.id)
    pub user_id: Uuid,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// JWT ID
    pub jti: String,
}

/// JWT manager for session token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_hours: i64,
}

impl JwtManager {
    /// Create a new JWT manager
    pub fn new(secret: &str, access_token_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expiry_hours,
        }
    }

    /// Generate an access token for a principal
    pub fn generate_access_token(&self, user_id: Uuid) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::hours(self.access_token_expiry_hours);

        self.encode_claims(&Claims {
            user_id,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
        })
    }

    pub(crate) fn encode_claims(&self, claims: &Claims) -> Result<String, JwtError> {
        // Explicit algorithm prevents algorithm confusion attacks
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECONDS;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }

    /// Get access token expiry in seconds
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_hours * 3600
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-chars!";

    #[test]
    fn test_token_generation_and_validation() {
        let jwt = JwtManager::new(SECRET, 24);
        let user_id = Uuid::new_v4();

        let token = jwt.generate_access_token(user_id).expect("Failed to generate token");
        let claims = jwt.validate_token(&token).expect("Invalid token");

        assert_eq!(claims.user_id, user_id);
        assert!(claims.exp > claims.iat);
        assert!(!claims.jti.is_empty());
        assert_eq!(jwt.access_token_expiry_seconds(), 24 * 3600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let jwt = JwtManager::new(SECRET, 24);
        let issued = OffsetDateTime::now_utc() - Duration::hours(2);
        let token = jwt
            .encode_claims(&Claims {
                user_id: Uuid::new_v4(),
                iat: issued.unix_timestamp(),
                exp: (issued + Duration::hours(1)).unix_timestamp(),
                jti: Uuid::new_v4().to_string(),
            })
            .unwrap();

        assert!(matches!(jwt.validate_token(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let ours = JwtManager::new(SECRET, 24);
        let theirs = JwtManager::new("another-secret-key-at-least-32-chars", 24);
        let token = theirs.generate_access_token(Uuid::new_v4()).unwrap();

        assert!(ours.validate_token(&token).is_err());
        assert!(ours.validate_token("not.a.jwt").is_err());
    }
}
