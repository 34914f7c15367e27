//! Common types used across SupportDesk

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Room (ticket) ID wrapper
///
/// Opaque 128-bit identifier handed out by the ticket-creation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Name of the broadcast group carrying this room's traffic
    pub fn group_name(&self) -> String {
        format!("chat_{}", self.0)
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RoomId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for RoomId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Which population a principal belongs to
///
/// Serialized with the names used on the wire (`agent` / `client`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKind {
    #[serde(rename = "agent")]
    Staff,
    #[serde(rename = "client")]
    EndUser,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Staff => "agent",
            IdentityKind::EndUser => "client",
        }
    }
}

impl FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(IdentityKind::Staff),
            "client" => Ok(IdentityKind::EndUser),
            other => Err(format!("unknown identity kind: {other}")),
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved principal behind a connection. Lives as long as the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub kind: IdentityKind,
}

impl Identity {
    pub fn staff(id: Uuid) -> Self {
        Self {
            id,
            kind: IdentityKind::Staff,
        }
    }

    pub fn end_user(id: Uuid) -> Self {
        Self {
            id,
            kind: IdentityKind::EndUser,
        }
    }
}
