//! Per-connection room consumer
//!
//! One consumer owns one admitted connection. It joins the room's group,
//! persists and republishes what its client sends, and turns group events
//! back into socket frames. Lifecycle: `Connecting -> Joined -> Left`.

use std::sync::Arc;

use supportdesk_shared::{ChatMessage, GroupEvent, InboundFrame};
use uuid::Uuid;

use super::authenticator::{ConnectionContext, HandshakeStage, Rejection, CLOSE_FORBIDDEN, CLOSE_INTERNAL};
use super::bus::{BroadcastBus, EventSender, GroupMember};
use crate::auth::AccessGate;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Connecting,
    Joined,
    Left,
}

pub struct RoomConsumer {
    context: ConnectionContext,
    session_id: Uuid,
    group: String,
    state: ConsumerState,
    bus: Arc<dyn BroadcastBus>,
    store: Arc<dyn RecordStore>,
    gate: AccessGate,
}

impl RoomConsumer {
    pub fn new(
        context: ConnectionContext,
        bus: Arc<dyn BroadcastBus>,
        store: Arc<dyn RecordStore>,
        gate: AccessGate,
    ) -> Self {
        Self {
            group: context.room_id.group_name(),
            context,
            session_id: Uuid::new_v4(),
            state: ConsumerState::Connecting,
            bus,
            store,
            gate,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Re-check admission and join the room group
    ///
    /// Group events for this connection are sent to `outbound`.
    pub async fn on_open(&mut self, outbound: EventSender) -> Result<(), Rejection> {
        let ConnectionContext { room_id, identity } = self.context;

        if !self.gate.can_join(&identity, room_id).await {
            tracing::info!(room_id = %room_id, user_id = %identity.id, "Join refused");
            self.state = ConsumerState::Left;
            return Err(Rejection {
                code: CLOSE_FORBIDDEN,
                reason: "Access denied".to_string(),
                stage: HandshakeStage::JoinAuthorized,
            });
        }

        if let Err(e) = self
            .bus
            .join(&self.group, GroupMember::new(self.session_id, outbound))
            .await
        {
            tracing::error!(error = ?e, room_id = %room_id, "Failed to join room group");
            self.state = ConsumerState::Left;
            return Err(Rejection {
                code: CLOSE_INTERNAL,
                reason: "Internal error".to_string(),
                stage: HandshakeStage::JoinAuthorized,
            });
        }

        self.state = ConsumerState::Joined;
        tracing::info!(
            session_id = %self.session_id,
            room_id = %room_id,
            user_id = %identity.id,
            kind = %identity.kind,
            "Joined room"
        );
        Ok(())
    }

    /// Handle one text frame from the client
    ///
    /// Malformed and empty frames are dropped without a reply. The message
    /// is only published once the store has accepted it. Returns the
    /// published message.
    pub async fn on_inbound_text(&self, payload: &str) -> Option<ChatMessage> {
        if self.state != ConsumerState::Joined {
            return None;
        }

        let frame = match InboundFrame::parse(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, session_id = %self.session_id, "Dropping malformed frame");
                return None;
            }
        };
        if frame.text.is_empty() {
            return None;
        }

        let ConnectionContext { room_id, identity } = self.context;
        let stored = match self
            .store
            .create_message(room_id, identity.id, &frame.text)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(error = ?e, room_id = %room_id, "Failed to persist message");
                return None;
            }
        };

        let message = stored.into_chat_message(identity.kind);
        let event = GroupEvent::ChatMessage {
            message: message.clone(),
        };
        if let Err(e) = self.bus.publish(&self.group, event).await {
            tracing::error!(
                error = ?e,
                room_id = %room_id,
                message_id = %message.id,
                "Persisted message could not be published"
            );
            return None;
        }

        Some(message)
    }

    /// Serialize a group event into the frame pushed to this socket
    pub fn on_group_event(event: &GroupEvent) -> Result<String, serde_json::Error> {
        match event {
            GroupEvent::ChatMessage { message } => serde_json::to_string(message),
        }
    }

    /// Leave the room group. Safe to call more than once.
    pub async fn on_close(&mut self) {
        if self.state == ConsumerState::Joined {
            self.bus.leave(&self.group, self.session_id).await;
            tracing::info!(
                session_id = %self.session_id,
                room_id = %self.context.room_id,
                "Left room"
            );
        }
        self.state = ConsumerState::Left;
    }
}
