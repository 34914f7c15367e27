//! In-memory record store
//!
//! Backs the test suite and single-process development runs. Seeding
//! helpers stand in for the admin tooling that populates Postgres.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use supportdesk_shared::{ChatMessage, IdentityKind, RoomId};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AgentRecord, BotChats, BotRecord, ChatSummary, GroupRecord, RecordStore, RoomInfo, RoomRecord,
    StoreError, StoreResult, StoredMessage, UserRecord,
};

#[derive(Debug, Clone)]
struct ClientRow {
    id: Uuid,
    name: String,
    telegram_id: String,
}

#[derive(Debug, Clone)]
struct RequestRow {
    id: RoomId,
    client_id: Uuid,
    bot_id: Uuid,
    theme: String,
    is_solved: bool,
    solved_by: Option<Uuid>,
    created: OffsetDateTime,
}

#[derive(Debug, Default)]
struct GroupRow {
    name: String,
    bots: HashSet<Uuid>,
    agents: HashSet<Uuid>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    agents: HashMap<Uuid, AgentRecord>,
    clients: HashMap<Uuid, ClientRow>,
    bots: HashMap<Uuid, BotRecord>,
    groups: HashMap<Uuid, GroupRow>,
    requests: HashMap<RoomId, RequestRow>,
    /// Append-only; insertion order is send order
    messages: Vec<StoredMessage>,
}

/// Record store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bot with a fresh issuer secret
    pub async fn add_bot(&self, name: &str) -> BotRecord {
        let bot = BotRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            secret_key: Uuid::new_v4(),
        };
        self.tables.write().await.bots.insert(bot.id, bot.clone());
        bot
    }

    /// Register a staff account
    pub async fn add_agent(&self, username: &str, password_hash: &str) -> AgentRecord {
        let agent = AgentRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_active: true,
        };
        let mut tables = self.tables.write().await;
        tables.users.insert(
            agent.id,
            UserRecord {
                id: agent.id,
                username: username.to_string(),
                kind: IdentityKind::Staff,
            },
        );
        tables.agents.insert(agent.id, agent.clone());
        agent
    }

    pub async fn add_group(&self, name: &str) -> GroupRecord {
        let group = GroupRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.tables.write().await.groups.insert(
            group.id,
            GroupRow {
                name: name.to_string(),
                ..Default::default()
            },
        );
        group
    }

    pub async fn add_bot_to_group(&self, group_id: Uuid, bot_id: Uuid) {
        if let Some(group) = self.tables.write().await.groups.get_mut(&group_id) {
            group.bots.insert(bot_id);
        }
    }

    pub async fn add_agent_to_group(&self, group_id: Uuid, agent_id: Uuid) {
        if let Some(group) = self.tables.write().await.groups.get_mut(&group_id) {
            group.agents.insert(agent_id);
        }
    }

    /// Close a ticket on behalf of a staff member
    pub async fn mark_solved(&self, room_id: RoomId, agent_id: Uuid) {
        if let Some(request) = self.tables.write().await.requests.get_mut(&room_id) {
            request.is_solved = true;
            request.solved_by = Some(agent_id);
        }
    }

    /// Delete a ticket and its messages
    pub async fn remove_room(&self, room_id: RoomId) {
        let mut tables = self.tables.write().await;
        tables.requests.remove(&room_id);
        tables.messages.retain(|m| m.room_id != room_id);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_room(&self, room_id: RoomId) -> StoreResult<Option<RoomRecord>> {
        let tables = self.tables.read().await;
        let Some(request) = tables.requests.get(&room_id) else {
            return Ok(None);
        };
        let client = tables
            .clients
            .get(&request.client_id)
            .ok_or_else(|| StoreError::Corrupt(format!("request {room_id} has no client")))?;
        let bot = tables
            .bots
            .get(&request.bot_id)
            .ok_or_else(|| StoreError::Corrupt(format!("request {room_id} has no bot")))?;

        Ok(Some(RoomRecord {
            id: request.id,
            bot_id: bot.id,
            bot_secret: bot.secret_key,
            client_id: client.id,
            client_external_id: client.telegram_id.clone(),
            theme: request.theme.clone(),
            is_solved: request.is_solved,
            created: request.created,
        }))
    }

    async fn agent_shares_group_with_bot(&self, agent_id: Uuid, bot_id: Uuid) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .groups
            .values()
            .any(|g| g.bots.contains(&bot_id) && g.agents.contains(&agent_id)))
    }

    async fn find_bot_by_secret(&self, secret: Uuid) -> StoreResult<Option<BotRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.bots.values().find(|b| b.secret_key == secret).cloned())
    }

    async fn find_agent_by_username(&self, username: &str) -> StoreResult<Option<AgentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.agents.values().find(|a| a.username == username).cloned())
    }

    async fn open_request(
        &self,
        bot_id: Uuid,
        telegram_id: &str,
        name: &str,
        theme: &str,
    ) -> StoreResult<RoomId> {
        let mut tables = self.tables.write().await;
        if !tables.bots.contains_key(&bot_id) {
            return Err(StoreError::NotFound);
        }

        let existing = tables
            .clients
            .values()
            .find(|c| c.telegram_id == telegram_id)
            .map(|c| c.id);
        let client_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                tables.users.insert(
                    id,
                    UserRecord {
                        id,
                        username: telegram_id.to_string(),
                        kind: IdentityKind::EndUser,
                    },
                );
                tables.clients.insert(
                    id,
                    ClientRow {
                        id,
                        name: name.to_string(),
                        telegram_id: telegram_id.to_string(),
                    },
                );
                tracing::debug!(client_id = %id, "Created client record");
                id
            }
        };

        let room_id = RoomId::new();
        tables.requests.insert(
            room_id,
            RequestRow {
                id: room_id,
                client_id,
                bot_id,
                theme: theme.to_string(),
                is_solved: false,
                solved_by: None,
                created: OffsetDateTime::now_utc(),
            },
        );
        Ok(room_id)
    }

    async fn create_message(&self, room_id: RoomId, author_id: Uuid, text: &str) -> StoreResult<StoredMessage> {
        let mut tables = self.tables.write().await;
        if !tables.requests.contains_key(&room_id) {
            return Err(StoreError::NotFound);
        }
        if !tables.users.contains_key(&author_id) {
            return Err(StoreError::NotFound);
        }

        let message = StoredMessage {
            id: Uuid::new_v4(),
            room_id,
            user_id: author_id,
            text: text.to_string(),
            sended: OffsetDateTime::now_utc(),
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        room_id: RoomId,
        before: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        let in_room: Vec<&StoredMessage> = tables
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .collect();

        let end = match before {
            Some(anchor) => in_room
                .iter()
                .position(|m| m.id == anchor)
                .ok_or(StoreError::NotFound)?,
            None => in_room.len(),
        };
        let start = end.saturating_sub(limit);

        in_room[start..end]
            .iter()
            .map(|m| {
                let kind = tables
                    .users
                    .get(&m.user_id)
                    .map(|u| u.kind)
                    .ok_or_else(|| StoreError::Corrupt(format!("message {} has no author", m.id)))?;
                Ok((*m).clone().into_chat_message(kind))
            })
            .collect()
    }

    async fn groups_for_agent(&self, agent_id: Uuid) -> StoreResult<Vec<GroupRecord>> {
        let tables = self.tables.read().await;
        let mut groups: Vec<GroupRecord> = tables
            .groups
            .iter()
            .filter(|(_, g)| g.agents.contains(&agent_id))
            .map(|(id, g)| GroupRecord {
                id: *id,
                name: g.name.clone(),
            })
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn find_agent_group(&self, agent_id: Uuid, group_id: Uuid) -> StoreResult<Option<GroupRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .groups
            .get(&group_id)
            .filter(|g| g.agents.contains(&agent_id))
            .map(|g| GroupRecord {
                id: group_id,
                name: g.name.clone(),
            }))
    }

    async fn chats_in_group(&self, group_id: Uuid) -> StoreResult<Vec<BotChats>> {
        let tables = self.tables.read().await;
        let Some(group) = tables.groups.get(&group_id) else {
            return Ok(Vec::new());
        };

        let mut bots: Vec<&BotRecord> = group.bots.iter().filter_map(|id| tables.bots.get(id)).collect();
        bots.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(bots
            .into_iter()
            .map(|bot| {
                let mut requests: Vec<&RequestRow> =
                    tables.requests.values().filter(|r| r.bot_id == bot.id).collect();
                requests.sort_by_key(|r| (r.created, r.id.0));

                let chats = requests
                    .into_iter()
                    .map(|r| ChatSummary {
                        id: r.id,
                        theme: r.theme.clone(),
                        last_msg: tables
                            .messages
                            .iter()
                            .rev()
                            .find(|m| m.room_id == r.id)
                            .map(|m| m.text.clone()),
                    })
                    .collect();

                BotChats {
                    bot_name: bot.name.clone(),
                    chats,
                }
            })
            .collect())
    }

    async fn room_info(&self, room_id: RoomId) -> StoreResult<Option<RoomInfo>> {
        let tables = self.tables.read().await;
        let Some(request) = tables.requests.get(&room_id) else {
            return Ok(None);
        };
        let client = tables
            .clients
            .get(&request.client_id)
            .ok_or_else(|| StoreError::Corrupt(format!("request {room_id} has no client")))?;

        Ok(Some(RoomInfo {
            id: request.id,
            client_name: client.name.clone(),
            created: request.created,
            is_solved: request.is_solved,
            theme: request.theme.clone(),
            solved_by: request.solved_by,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_request_reuses_client() {
        let store = MemoryStore::new();
        let bot = store.add_bot("support-bot").await;

        let first = store.open_request(bot.id, "42", "Alice", "Billing question").await.unwrap();
        let second = store.open_request(bot.id, "42", "Alice", "Another one").await.unwrap();
        assert_ne!(first, second);

        let a = store.find_room(first).await.unwrap().unwrap();
        let b = store.find_room(second).await.unwrap().unwrap();
        assert_eq!(a.client_id, b.client_id);
        assert_eq!(a.client_external_id, "42");
        assert_eq!(a.bot_secret, bot.secret_key);
        assert_eq!(a.theme, "Billing question");
    }

    #[tokio::test]
    async fn test_room_info_keeps_client_name() {
        let store = MemoryStore::new();
        let bot = store.add_bot("support-bot").await;
        let agent = store.add_agent("alice", "hash").await;
        let room = store.open_request(bot.id, "42", "Bob Smith", "Billing question").await.unwrap();

        let info = store.room_info(room).await.unwrap().unwrap();
        assert_eq!(info.client_name, "Bob Smith");
        assert_eq!(info.theme, "Billing question");
        assert!(!info.is_solved);
        assert_eq!(info.solved_by, None);

        store.mark_solved(room, agent.id).await;
        let info = store.room_info(room).await.unwrap().unwrap();
        assert!(info.is_solved);
        assert_eq!(info.solved_by, Some(agent.id));

        assert!(store.room_info(RoomId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_client_username_may_match_agent_username() {
        let store = MemoryStore::new();
        let bot = store.add_bot("support-bot").await;
        store.add_agent("42", "hash").await;

        let room = store.open_request(bot.id, "42", "Bob", "Theme").await.unwrap();
        let record = store.find_room(room).await.unwrap().unwrap();
        let user = store.find_user(record.client_id).await.unwrap().unwrap();
        assert_eq!(user.kind, IdentityKind::EndUser);
        assert_eq!(store.find_agent_by_username("42").await.unwrap().unwrap().username, "42");
    }

    #[tokio::test]
    async fn test_chats_in_group_by_bot() {
        let store = MemoryStore::new();
        let zeta = store.add_bot("zeta-bot").await;
        let alpha = store.add_bot("alpha-bot").await;
        let outsider = store.add_bot("other-bot").await;
        let group = store.add_group("Tier 1").await;
        store.add_bot_to_group(group.id, zeta.id).await;
        store.add_bot_to_group(group.id, alpha.id).await;

        let quiet = store.open_request(alpha.id, "42", "Bob", "Quiet").await.unwrap();
        let busy = store.open_request(zeta.id, "43", "Eve", "Busy").await.unwrap();
        store.open_request(outsider.id, "44", "Mallory", "Elsewhere").await.unwrap();
        let eve = store.find_room(busy).await.unwrap().unwrap().client_id;
        store.create_message(busy, eve, "first").await.unwrap();
        store.create_message(busy, eve, "second").await.unwrap();

        let listed = store.chats_in_group(group.id).await.unwrap();
        assert_eq!(
            listed,
            vec![
                BotChats {
                    bot_name: "alpha-bot".to_string(),
                    chats: vec![ChatSummary {
                        id: quiet,
                        theme: "Quiet".to_string(),
                        last_msg: None,
                    }],
                },
                BotChats {
                    bot_name: "zeta-bot".to_string(),
                    chats: vec![ChatSummary {
                        id: busy,
                        theme: "Busy".to_string(),
                        last_msg: Some("second".to_string()),
                    }],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_find_agent_group_requires_membership() {
        let store = MemoryStore::new();
        let agent = store.add_agent("alice", "hash").await;
        let group = store.add_group("Tier 1").await;

        assert!(store.find_agent_group(agent.id, group.id).await.unwrap().is_none());
        store.add_agent_to_group(group.id, agent.id).await;
        assert_eq!(store.find_agent_group(agent.id, group.id).await.unwrap(), Some(group));
        assert!(store.find_agent_group(agent.id, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_request_unknown_bot() {
        let store = MemoryStore::new();
        let result = store.open_request(Uuid::new_v4(), "42", "Alice", "Theme").await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_message_history_paging() {
        let store = MemoryStore::new();
        let bot = store.add_bot("support-bot").await;
        let room = store.open_request(bot.id, "42", "Alice", "Theme").await.unwrap();
        let client_id = store.find_room(room).await.unwrap().unwrap().client_id;

        let mut ids = Vec::new();
        for i in 0..5 {
            let msg = store.create_message(room, client_id, &format!("m{i}")).await.unwrap();
            ids.push(msg.id);
        }

        let latest = store.list_messages(room, None, 2).await.unwrap();
        let texts: Vec<_> = latest.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m3", "m4"]);
        assert_eq!(latest[0].user_type, IdentityKind::EndUser);

        let older = store.list_messages(room, Some(ids[3]), 10).await.unwrap();
        let texts: Vec<_> = older.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2"]);
    }

    #[tokio::test]
    async fn test_message_into_missing_room_fails() {
        let store = MemoryStore::new();
        let agent = store.add_agent("alice", "hash").await;
        let result = store.create_message(RoomId::new(), agent.id, "hello").await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_group_membership() {
        let store = MemoryStore::new();
        let bot = store.add_bot("support-bot").await;
        let agent = store.add_agent("alice", "hash").await;
        let group = store.add_group("Tier 1").await;

        assert!(!store.agent_shares_group_with_bot(agent.id, bot.id).await.unwrap());

        store.add_bot_to_group(group.id, bot.id).await;
        assert!(!store.agent_shares_group_with_bot(agent.id, bot.id).await.unwrap());

        store.add_agent_to_group(group.id, agent.id).await;
        assert!(store.agent_shares_group_with_bot(agent.id, bot.id).await.unwrap());
        assert_eq!(store.groups_for_agent(agent.id).await.unwrap(), vec![group]);
    }
}
