//! Room admission policy

use std::sync::Arc;

use supportdesk_shared::{Identity, IdentityKind, RoomId};

use crate::store::RecordStore;

/// Decides whether an identity may join a room
#[derive(Clone)]
pub struct AccessGate {
    store: Arc<dyn RecordStore>,
}

impl AccessGate {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Staff may join rooms of bots held by one of their groups; end-users
    /// may join only their own rooms. A vanished room or a failed lookup
    /// denies.
    pub async fn can_join(&self, identity: &Identity, room_id: RoomId) -> bool {
        let room = match self.store.find_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                tracing::debug!(room_id = %room_id, "Access check on missing room");
                return false;
            }
            Err(e) => {
                tracing::error!(error = ?e, room_id = %room_id, "Access check lookup failed");
                return false;
            }
        };

        match identity.kind {
            IdentityKind::Staff => {
                match self
                    .store
                    .agent_shares_group_with_bot(identity.id, room.bot_id)
                    .await
                {
                    Ok(allowed) => allowed,
                    Err(e) => {
                        tracing::error!(error = ?e, room_id = %room_id, "Group membership lookup failed");
                        false
                    }
                }
            }
            IdentityKind::EndUser => room.client_id == identity.id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_staff_needs_group_holding_bot() {
        let store = Arc::new(MemoryStore::new());
        let gate = AccessGate::new(store.clone());

        let bot = store.add_bot("support-bot").await;
        let other_bot = store.add_bot("sales-bot").await;
        let agent = store.add_agent("alice", "hash").await;
        let room = store.open_request(bot.id, "42", "Bob", "Theme").await.unwrap();
        let staff = Identity::staff(agent.id);

        // Not in any group
        assert!(!gate.can_join(&staff, room).await);

        // In a group that holds a different bot
        let sales = store.add_group("Sales").await;
        store.add_bot_to_group(sales.id, other_bot.id).await;
        store.add_agent_to_group(sales.id, agent.id).await;
        assert!(!gate.can_join(&staff, room).await);

        // Added to a group holding the room's bot
        let support = store.add_group("Support").await;
        store.add_bot_to_group(support.id, bot.id).await;
        store.add_agent_to_group(support.id, agent.id).await;
        assert!(gate.can_join(&staff, room).await);
    }

    #[tokio::test]
    async fn test_end_user_only_own_room() {
        let store = Arc::new(MemoryStore::new());
        let gate = AccessGate::new(store.clone());

        let bot = store.add_bot("support-bot").await;
        let mine = store.open_request(bot.id, "42", "Bob", "Theme").await.unwrap();
        let theirs = store.open_request(bot.id, "43", "Eve", "Theme").await.unwrap();
        let owner = store.find_room(mine).await.unwrap().unwrap().client_id;

        let me = Identity::end_user(owner);
        assert!(gate.can_join(&me, mine).await);
        assert!(!gate.can_join(&me, theirs).await);
        assert!(!gate.can_join(&Identity::end_user(Uuid::new_v4()), mine).await);
    }

    #[tokio::test]
    async fn test_vanished_room_denies() {
        let store = Arc::new(MemoryStore::new());
        let gate = AccessGate::new(store.clone());

        let bot = store.add_bot("support-bot").await;
        let room = store.open_request(bot.id, "42", "Bob", "Theme").await.unwrap();
        let owner = store.find_room(room).await.unwrap().unwrap().client_id;

        store.remove_room(room).await;
        assert!(!gate.can_join(&Identity::end_user(owner), room).await);
        assert!(!gate.can_join(&Identity::staff(Uuid::new_v4()), RoomId::new()).await);
    }
}
