//! Authentication and authorization for SupportDesk

pub mod extractor;
pub mod gate;
pub mod jwt;
pub mod password;
pub mod verifier;

pub use extractor::StaffSession;
pub use gate::AccessGate;
pub use jwt::{Claims, JwtError, JwtManager};
pub use password::{agent_password_matches, hash_password, verify_password, PasswordError};
pub use verifier::TokenVerifier;

use crate::store::StoreError;

/// Why a presented credential could not be turned into an identity
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed, unsigned, expired or unresolvable credential
    #[error("{0}")]
    InvalidCredential(String),
    /// Well-formed proxy token issued for a different end-user than the room's owner
    #[error("Secure key does not match this chat")]
    CredentialMismatch,
    /// The record store could not answer
    #[error("Record store unavailable: {0}")]
    Store(#[from] StoreError),
}
