//! Record store boundary
//!
//! Tickets, messages, accounts and staff groups live behind [`RecordStore`].
//! Every lookup is a single round trip; nothing here caches.
//!
//! - **PgStore**: Postgres implementation used in production
//! - **MemoryStore**: in-process implementation for tests and local runs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use supportdesk_shared::{ChatMessage, IdentityKind, RoomId};
use time::OffsetDateTime;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Maximum number of messages returned by one history page
pub const HISTORY_PAGE_SIZE: usize = 100;

// =============================================================================
// Records
// =============================================================================

/// Common principal row shared by staff and end-users
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub kind: IdentityKind,
}

/// A ticket, joined with its owning bot and end-user
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub id: RoomId,
    pub bot_id: Uuid,
    pub bot_secret: Uuid,
    pub client_id: Uuid,
    /// Identifier of the end-user on the bot's platform (the proxy-token message)
    pub client_external_id: String,
    pub theme: String,
    pub is_solved: bool,
    pub created: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct BotRecord {
    pub id: Uuid,
    pub name: String,
    pub secret_key: Uuid,
}

#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: Uuid,
    pub name: String,
}

/// A ticket as listed under its bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: RoomId,
    pub theme: String,
    /// Text of the newest message, if any
    pub last_msg: Option<String>,
}

/// One bot of a staff group with its tickets, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotChats {
    pub bot_name: String,
    pub chats: Vec<ChatSummary>,
}

/// Ticket details shown next to its history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: RoomId,
    pub client_name: String,
    pub created: OffsetDateTime,
    pub is_solved: bool,
    pub theme: String,
    pub solved_by: Option<Uuid>,
}

/// A message as written by [`RecordStore::create_message`]
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: Uuid,
    pub room_id: RoomId,
    pub user_id: Uuid,
    pub text: String,
    pub sended: OffsetDateTime,
}

impl StoredMessage {
    /// Attach the author's kind to produce the wire message
    pub fn into_chat_message(self, author_kind: IdentityKind) -> ChatMessage {
        ChatMessage {
            id: self.id,
            user_id: self.user_id,
            user_type: author_kind,
            text: self.text,
            sended: self.sended,
        }
    }
}

// =============================================================================
// Store trait
// =============================================================================

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<UserRecord>>;

    async fn find_room(&self, room_id: RoomId) -> StoreResult<Option<RoomRecord>>;

    /// True iff some staff group holds `bot_id` and lists `agent_id` as a member
    async fn agent_shares_group_with_bot(&self, agent_id: Uuid, bot_id: Uuid) -> StoreResult<bool>;

    async fn find_bot_by_secret(&self, secret: Uuid) -> StoreResult<Option<BotRecord>>;

    async fn find_agent_by_username(&self, username: &str) -> StoreResult<Option<AgentRecord>>;

    /// Get-or-create the end-user by platform id, then open a new ticket for it
    async fn open_request(
        &self,
        bot_id: Uuid,
        telegram_id: &str,
        name: &str,
        theme: &str,
    ) -> StoreResult<RoomId>;

    /// Persist a message. An `Err` means nothing was stored.
    async fn create_message(&self, room_id: RoomId, author_id: Uuid, text: &str) -> StoreResult<StoredMessage>;

    /// Messages of a room strictly older than `before` (or the newest ones), oldest first
    async fn list_messages(
        &self,
        room_id: RoomId,
        before: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>>;

    async fn groups_for_agent(&self, agent_id: Uuid) -> StoreResult<Vec<GroupRecord>>;

    /// The group, if `agent_id` is one of its members
    async fn find_agent_group(&self, agent_id: Uuid, group_id: Uuid) -> StoreResult<Option<GroupRecord>>;

    /// Every bot of the group with its tickets, bots ordered by name
    async fn chats_in_group(&self, group_id: Uuid) -> StoreResult<Vec<BotChats>>;

    async fn room_info(&self, room_id: RoomId) -> StoreResult<Option<RoomInfo>>;

    /// Readiness probe
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;
