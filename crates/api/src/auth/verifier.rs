//! Credential verification for room connections
//!
//! Two credential kinds are accepted:
//! - **Session token**: JWT issued to staff at login
//! - **Proxy token**: HMAC of the end-user's platform id keyed by the bot's
//!   issuer secret, presented by end-users coming through a bot

use std::sync::Arc;

use supportdesk_shared::secure::{decode_proxy_token, macs_match, proxy_mac, PROXY_TOKEN_LEN};
use supportdesk_shared::{Identity, RoomId};

use super::jwt::{JwtError, JwtManager};
use super::AuthError;
use crate::store::RecordStore;

/// Stateless verifier for both credential kinds
#[derive(Clone)]
pub struct TokenVerifier {
    jwt: JwtManager,
    store: Arc<dyn RecordStore>,
}

impl TokenVerifier {
    pub fn new(jwt: JwtManager, store: Arc<dyn RecordStore>) -> Self {
        Self { jwt, store }
    }

    /// Verify a staff session token and resolve the principal it names
    pub async fn verify_session(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.jwt.validate_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Session token rejected");
            match e {
                JwtError::Expired => AuthError::InvalidCredential("Token has expired".to_string()),
                _ => AuthError::InvalidCredential("Invalid or expired token".to_string()),
            }
        })?;

        let user = self
            .store
            .find_user(claims.user_id)
            .await?
            .ok_or_else(|| AuthError::InvalidCredential("Invalid or expired token".to_string()))?;

        Ok(Identity {
            id: user.id,
            kind: user.kind,
        })
    }

    /// Verify an end-user proxy token against the room it is presented for
    pub async fn verify_proxy(&self, room_id: RoomId, token: &str) -> Result<Identity, AuthError> {
        let room = self
            .store
            .find_room(room_id)
            .await?
            .ok_or_else(|| AuthError::InvalidCredential("Chat not found".to_string()))?;

        let presented = decode_proxy_token(token)
            .map_err(|_| AuthError::InvalidCredential("Malformed secure key".to_string()))?;
        if presented.len() != PROXY_TOKEN_LEN {
            return Err(AuthError::InvalidCredential("Malformed secure key".to_string()));
        }

        let expected = proxy_mac(&room.bot_secret.to_string(), &room.client_external_id)
            .map_err(|_| AuthError::InvalidCredential("Invalid bot credentials".to_string()))?;

        if !macs_match(&presented, &expected) {
            tracing::debug!(room_id = %room_id, "Proxy token does not match room owner");
            return Err(AuthError::CredentialMismatch);
        }

        Ok(Identity::end_user(room.client_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwt::Claims;
    use crate::store::MemoryStore;
    use base64::engine::general_purpose::URL_SAFE;
    use base64::Engine as _;
    use supportdesk_shared::secure::generate_proxy_token;
    use supportdesk_shared::IdentityKind;
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    const JWT_SECRET: &str = "test-secret-key-at-least-32-chars!";

    struct Fixture {
        store: Arc<MemoryStore>,
        verifier: TokenVerifier,
        jwt: JwtManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let jwt = JwtManager::new(JWT_SECRET, 24);
        let verifier = TokenVerifier::new(jwt.clone(), store.clone());
        Fixture { store, verifier, jwt }
    }

    #[tokio::test]
    async fn test_session_token_resolves_staff() {
        let f = fixture();
        let agent = f.store.add_agent("alice", "hash").await;
        let token = f.jwt.generate_access_token(agent.id).unwrap();

        let identity = f.verifier.verify_session(&token).await.unwrap();
        assert_eq!(identity, Identity::staff(agent.id));
    }

    #[tokio::test]
    async fn test_session_token_for_unknown_user() {
        let f = fixture();
        let token = f.jwt.generate_access_token(Uuid::new_v4()).unwrap();

        let result = f.verifier.verify_session(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidCredential(_))));
    }

    #[tokio::test]
    async fn test_expired_session_tokens_rejected() {
        let f = fixture();
        let agent = f.store.add_agent("alice", "hash").await;

        // Expired by two minutes up to a week: all beyond the allowed skew
        for minutes_past in [2, 30, 60 * 24, 60 * 24 * 7] {
            let exp = OffsetDateTime::now_utc() - Duration::minutes(minutes_past);
            let token = f
                .jwt
                .encode_claims(&Claims {
                    user_id: agent.id,
                    iat: (exp - Duration::hours(1)).unix_timestamp(),
                    exp: exp.unix_timestamp(),
                    jti: Uuid::new_v4().to_string(),
                })
                .unwrap();

            let result = f.verifier.verify_session(&token).await;
            assert!(
                matches!(result, Err(AuthError::InvalidCredential(_))),
                "token expired {minutes_past} minutes ago was accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_session_token() {
        let f = fixture();
        for token in ["", "abc", "a.b.c"] {
            assert!(matches!(
                f.verifier.verify_session(token).await,
                Err(AuthError::InvalidCredential(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_proxy_token_accepted_for_room_owner() {
        let f = fixture();
        let bot = f.store.add_bot("support-bot").await;
        let room = f.store.open_request(bot.id, "42", "Alice", "Billing question").await.unwrap();
        let record = f.store.find_room(room).await.unwrap().unwrap();

        let token = generate_proxy_token(&bot.secret_key.to_string(), "42").unwrap();
        let identity = f.verifier.verify_proxy(room, &token).await.unwrap();

        assert_eq!(identity.kind, IdentityKind::EndUser);
        assert_eq!(identity.id, record.client_id);
    }

    #[tokio::test]
    async fn test_proxy_token_rejects_every_single_bit_mutation() {
        let f = fixture();
        let bot = f.store.add_bot("support-bot").await;
        let room = f.store.open_request(bot.id, "42", "Alice", "Theme").await.unwrap();
        let secret = bot.secret_key.to_string();
        let mac = proxy_mac(&secret, "42").unwrap();

        for byte in 0..mac.len() {
            for bit in 0..8 {
                let mut mutated = mac;
                mutated[byte] ^= 1 << bit;
                let token = URL_SAFE.encode(mutated);
                assert!(
                    matches!(
                        f.verifier.verify_proxy(room, &token).await,
                        Err(AuthError::CredentialMismatch)
                    ),
                    "mutation of byte {byte} bit {bit} accepted"
                );
            }
        }

        // Bit flips in the encoded text either fail to decode or mismatch
        let token = generate_proxy_token(&secret, "42").unwrap();
        for index in 0..token.len() {
            for bit in 0..7 {
                let mut bytes = token.clone().into_bytes();
                bytes[index] ^= 1 << bit;
                let Ok(mutated) = String::from_utf8(bytes) else {
                    continue;
                };
                assert!(f.verifier.verify_proxy(room, &mutated).await.is_err());
            }
        }
    }

    #[tokio::test]
    async fn test_proxy_token_for_other_end_user() {
        let f = fixture();
        let bot = f.store.add_bot("support-bot").await;
        let room = f.store.open_request(bot.id, "42", "Alice", "Theme").await.unwrap();

        let token = generate_proxy_token(&bot.secret_key.to_string(), "43").unwrap();
        assert!(matches!(
            f.verifier.verify_proxy(room, &token).await,
            Err(AuthError::CredentialMismatch)
        ));
    }

    #[tokio::test]
    async fn test_proxy_token_lookup_miss_and_garbage() {
        let f = fixture();
        let bot = f.store.add_bot("support-bot").await;
        let room = f.store.open_request(bot.id, "42", "Alice", "Theme").await.unwrap();
        let token = generate_proxy_token(&bot.secret_key.to_string(), "42").unwrap();

        assert!(matches!(
            f.verifier.verify_proxy(RoomId::new(), &token).await,
            Err(AuthError::InvalidCredential(_))
        ));
        assert!(matches!(
            f.verifier.verify_proxy(room, "%%%").await,
            Err(AuthError::InvalidCredential(_))
        ));
        assert!(matches!(
            f.verifier.verify_proxy(room, &URL_SAFE.encode([0u8; 16])).await,
            Err(AuthError::InvalidCredential(_))
        ));
    }
}
