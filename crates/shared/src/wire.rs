//! Wire schemas for room traffic
//!
//! Every frame crossing a socket or the broadcast bus has a concrete type
//! here; frames missing a required field fail to parse.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::SharedError;
use crate::types::IdentityKind;

// =============================================================================
// Client-to-Server Frames
// =============================================================================

/// Frame sent by any room member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    pub text: String,
}

impl InboundFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn parse(payload: &str) -> Result<Self, SharedError> {
        Ok(serde_json::from_str(payload)?)
    }
}

// =============================================================================
// Server-to-Client Frames
// =============================================================================

/// A persisted chat message as pushed to every room member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_type: IdentityKind,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sended: OffsetDateTime,
}

impl ChatMessage {
    pub fn parse(payload: &str) -> Result<Self, SharedError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn is_from_staff(&self) -> bool {
        self.user_type == IdentityKind::Staff
    }
}

// =============================================================================
// Group Events
// =============================================================================

/// Events carried by the broadcast bus between room consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupEvent {
    ChatMessage { message: ChatMessage },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample_message() -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_type: IdentityKind::EndUser,
            text: "hi".to_string(),
            sended: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_inbound_frame_requires_text() {
        assert_eq!(InboundFrame::parse(r#"{"text":"hello"}"#).unwrap().text, "hello");
        assert!(InboundFrame::parse(r#"{"body":"hello"}"#).is_err());
        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn test_chat_message_wire_shape() {
        let message = sample_message();
        let json: serde_json::Value = serde_json::to_value(&message).unwrap();

        assert_eq!(json["id"], message.id.to_string());
        assert_eq!(json["user_type"], "client");
        assert_eq!(json["text"], "hi");
        assert_eq!(json["sended"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_chat_message_rejects_missing_fields() {
        let err = ChatMessage::parse(r#"{"id":"550e8400-e29b-41d4-a716-446655440000","text":"x"}"#);
        assert!(matches!(err, Err(SharedError::MalformedFrame(_))));
    }

    #[test]
    fn test_group_event_tagging() {
        let event = GroupEvent::ChatMessage {
            message: sample_message(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chat_message");
        assert_eq!(json["message"]["text"], "hi");

        let back: GroupEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
