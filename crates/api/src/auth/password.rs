//! Staff account passwords
//!
//! Hashes are Argon2id PHC strings stored in `agents.password_hash`.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::store::AgentRecord;

fn hasher() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    if password.is_empty() {
        return Err(PasswordError::Empty);
    }
    let salt = SaltString::generate(&mut OsRng);
    hasher()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Check a password against a stored hash. Parameters are read from the hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
    Ok(hasher().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// Whether `password` logs into `agent`. Deactivated accounts never do.
pub fn agent_password_matches(agent: &AgentRecord, password: &str) -> Result<bool, PasswordError> {
    if !agent.is_active {
        return Ok(false);
    }
    verify_password(password, &agent.password_hash)
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password must not be empty")]
    Empty,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Stored password hash is unreadable: {0}")]
    InvalidHash(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn agent(password: &str, is_active: bool) -> AgentRecord {
        AgentRecord {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            password_hash: hash_password(password).unwrap(),
            is_active,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }

    #[test]
    fn test_empty_password_is_not_hashed() {
        assert!(matches!(hash_password(""), Err(PasswordError::Empty)));
    }

    #[test]
    fn test_unreadable_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_inactive_agent_never_matches() {
        assert!(agent_password_matches(&agent("s3cret-pass", true), "s3cret-pass").unwrap());
        assert!(!agent_password_matches(&agent("s3cret-pass", true), "guess").unwrap());
        assert!(!agent_password_matches(&agent("s3cret-pass", false), "s3cret-pass").unwrap());
    }
}
