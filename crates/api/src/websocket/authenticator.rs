//! Handshake authentication for room connections
//!
//! Runs before a connection joins anything. The room id comes from the
//! request path (`/ws/chat/<room_id>/`) and exactly one credential from the
//! query string: `token` (staff session) or `secure_key` (end-user proxy
//! token). A failed handshake is closed with an application close code.

use serde::Deserialize;
use supportdesk_shared::{Identity, RoomId};

use crate::auth::{AccessGate, AuthError, TokenVerifier};

/// Missing or invalid room id or credential
pub const CLOSE_INVALID: u16 = 4001;
/// Valid credential that may not use this room
pub const CLOSE_FORBIDDEN: u16 = 4003;
/// The record store could not answer
pub const CLOSE_INTERNAL: u16 = 1011;

/// Last stage a handshake reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    Start,
    PathParsed,
    CredentialExtracted,
    Verified,
    JoinAuthorized,
}

/// A terminated handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: u16,
    pub reason: String,
    pub stage: HandshakeStage,
}

impl Rejection {
    fn new(code: u16, reason: impl Into<String>, stage: HandshakeStage) -> Self {
        Self {
            code,
            reason: reason.into(),
            stage,
        }
    }
}

/// Query parameters accepted on the upgrade request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
    pub secure_key: Option<String>,
}

/// The one credential a handshake carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Session(String),
    Proxy(String),
}

impl HandshakeQuery {
    /// Empty values count as absent; carrying both kinds is refused
    pub fn credential(&self) -> Result<Credential, &'static str> {
        let token = self.token.as_deref().filter(|t| !t.is_empty());
        let secure_key = self.secure_key.as_deref().filter(|k| !k.is_empty());

        match (token, secure_key) {
            (Some(token), None) => Ok(Credential::Session(token.to_string())),
            (None, Some(key)) => Ok(Credential::Proxy(key.to_string())),
            (Some(_), Some(_)) => Err("Ambiguous credentials"),
            (None, None) => Err("Missing credentials"),
        }
    }
}

/// Resolved context attached to an admitted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionContext {
    pub room_id: RoomId,
    pub identity: Identity,
}

/// Pull the room id out of `.../chat/<room_id>/`
pub fn parse_room_id(path: &str) -> Option<RoomId> {
    let (_, rest) = path.split_once("/chat/")?;
    let segment = rest.split('/').next()?;
    segment.parse().ok()
}

#[derive(Clone)]
pub struct ConnectionAuthenticator {
    verifier: TokenVerifier,
    gate: AccessGate,
}

impl ConnectionAuthenticator {
    pub fn new(verifier: TokenVerifier, gate: AccessGate) -> Self {
        Self { verifier, gate }
    }

    /// Walk the handshake from path parsing to join authorization
    pub async fn authenticate(
        &self,
        path: &str,
        query: &HandshakeQuery,
    ) -> Result<ConnectionContext, Rejection> {
        let room_id = parse_room_id(path).ok_or_else(|| {
            Rejection::new(CLOSE_INVALID, "Invalid chat id", HandshakeStage::Start)
        })?;

        let credential = query
            .credential()
            .map_err(|reason| Rejection::new(CLOSE_INVALID, reason, HandshakeStage::PathParsed))?;

        let verified = match &credential {
            Credential::Session(token) => self.verifier.verify_session(token).await,
            Credential::Proxy(key) => self.verifier.verify_proxy(room_id, key).await,
        };
        let identity = verified.map_err(|e| {
            let stage = HandshakeStage::CredentialExtracted;
            match e {
                AuthError::InvalidCredential(reason) => Rejection::new(CLOSE_INVALID, reason, stage),
                AuthError::CredentialMismatch => {
                    Rejection::new(CLOSE_FORBIDDEN, "Access denied", stage)
                }
                AuthError::Store(err) => {
                    tracing::error!(error = ?err, room_id = %room_id, "Handshake lookup failed");
                    Rejection::new(CLOSE_INTERNAL, "Internal error", stage)
                }
            }
        })?;

        if !self.gate.can_join(&identity, room_id).await {
            return Err(Rejection::new(
                CLOSE_FORBIDDEN,
                "Access denied",
                HandshakeStage::Verified,
            ));
        }

        tracing::debug!(
            room_id = %room_id,
            user_id = %identity.id,
            kind = %identity.kind,
            "Handshake accepted"
        );
        Ok(ConnectionContext { room_id, identity })
    }
}
