//! Postgres record store

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use supportdesk_shared::{ChatMessage, IdentityKind, RoomId};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    AgentRecord, BotChats, BotRecord, ChatSummary, GroupRecord, RecordStore, RoomInfo, RoomRecord,
    StoreError, StoreResult, StoredMessage, UserRecord,
};

/// Create a database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(60))
        .max_lifetime(Duration::from_secs(300))
        .connect(database_url)
        .await
}

fn parse_kind(raw: &str) -> StoreResult<IdentityKind> {
    raw.parse().map_err(StoreError::Corrupt)
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    kind: String,
}

#[derive(FromRow)]
struct RoomRow {
    id: Uuid,
    bot_id: Uuid,
    bot_secret: Uuid,
    client_id: Uuid,
    telegram_id: String,
    theme: String,
    is_solved: bool,
    created: OffsetDateTime,
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    text: String,
    sended: OffsetDateTime,
}

/// One bot of a group joined with one of its tickets (or none)
#[derive(FromRow)]
struct GroupChatRow {
    bot_id: Uuid,
    bot_name: String,
    request_id: Option<Uuid>,
    theme: Option<String>,
    last_msg: Option<String>,
}

#[derive(FromRow)]
struct RoomInfoRow {
    id: Uuid,
    client_name: String,
    created: OffsetDateTime,
    is_solved: bool,
    theme: String,
    solved_by: Option<Uuid>,
}

/// Record store backed by the Postgres schema in `migrations/`
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, username, kind FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(UserRecord {
                id: r.id,
                username: r.username,
                kind: parse_kind(&r.kind)?,
            })
        })
        .transpose()
    }

    async fn find_room(&self, room_id: RoomId) -> StoreResult<Option<RoomRecord>> {
        let row = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT r.id, r.bot_id, b.secret_key AS bot_secret, r.client_id, c.telegram_id,
                   r.theme, r.is_solved, r.created
            FROM requests r
            JOIN clients c ON c.id = r.client_id
            JOIN bots b ON b.id = r.bot_id
            WHERE r.id = $1
            "#,
        )
        .bind(room_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RoomRecord {
            id: RoomId(r.id),
            bot_id: r.bot_id,
            bot_secret: r.bot_secret,
            client_id: r.client_id,
            client_external_id: r.telegram_id,
            theme: r.theme,
            is_solved: r.is_solved,
            created: r.created,
        }))
    }

    async fn agent_shares_group_with_bot(&self, agent_id: Uuid, bot_id: Uuid) -> StoreResult<bool> {
        let shared = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
              SELECT 1 FROM group_bots gb
              JOIN group_agents ga ON ga.group_id = gb.group_id
              WHERE gb.bot_id = $1 AND ga.agent_id = $2
            )
            "#,
        )
        .bind(bot_id)
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(shared)
    }

    async fn find_bot_by_secret(&self, secret: Uuid) -> StoreResult<Option<BotRecord>> {
        let row = sqlx::query_as::<_, (Uuid, String, Uuid)>(
            "SELECT id, name, secret_key FROM bots WHERE secret_key = $1",
        )
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, name, secret_key)| BotRecord { id, name, secret_key }))
    }

    async fn find_agent_by_username(&self, username: &str) -> StoreResult<Option<AgentRecord>> {
        let row = sqlx::query_as::<_, (Uuid, String, String, bool)>(
            "SELECT id, username, password_hash, is_active FROM agents WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, username, password_hash, is_active)| AgentRecord {
            id,
            username,
            password_hash,
            is_active,
        }))
    }

    async fn open_request(
        &self,
        bot_id: Uuid,
        telegram_id: &str,
        name: &str,
        theme: &str,
    ) -> StoreResult<RoomId> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, Uuid>("SELECT id FROM clients WHERE telegram_id = $1")
            .bind(telegram_id)
            .fetch_optional(&mut *tx)
            .await?;

        let client_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                sqlx::query("INSERT INTO users (id, username, kind) VALUES ($1, $2, 'client')")
                    .bind(id)
                    .bind(telegram_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("INSERT INTO clients (id, name, telegram_id) VALUES ($1, $2, $3)")
                    .bind(id)
                    .bind(name)
                    .bind(telegram_id)
                    .execute(&mut *tx)
                    .await?;
                id
            }
        };

        let room_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO requests (id, client_id, bot_id, theme)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(bot_id)
        .bind(theme)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RoomId(room_id))
    }

    async fn create_message(&self, room_id: RoomId, author_id: Uuid, text: &str) -> StoreResult<StoredMessage> {
        let (id, sended) = sqlx::query_as::<_, (Uuid, OffsetDateTime)>(
            r#"
            INSERT INTO messages (id, request_id, user_id, text)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sended
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room_id.0)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoredMessage {
            id,
            room_id,
            user_id: author_id,
            text: text.to_string(),
            sended,
        })
    }

    async fn list_messages(
        &self,
        room_id: RoomId,
        before: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>> {
        let anchor = match before {
            Some(message_id) => Some(
                sqlx::query_scalar::<_, OffsetDateTime>("SELECT sended FROM messages WHERE id = $1")
                    .bind(message_id)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or(StoreError::NotFound)?,
            ),
            None => None,
        };

        let mut rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.user_id, u.kind, m.text, m.sended
            FROM messages m
            JOIN users u ON u.id = m.user_id
            WHERE m.request_id = $1
              AND ($2::timestamptz IS NULL OR m.sended < $2)
            ORDER BY m.sended DESC
            LIMIT $3
            "#,
        )
        .bind(room_id.0)
        .bind(anchor)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        rows.into_iter()
            .map(|r| {
                Ok(ChatMessage {
                    id: r.id,
                    user_id: r.user_id,
                    user_type: parse_kind(&r.kind)?,
                    text: r.text,
                    sended: r.sended,
                })
            })
            .collect()
    }

    async fn groups_for_agent(&self, agent_id: Uuid) -> StoreResult<Vec<GroupRecord>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT g.id, g.name
            FROM groups g
            JOIN group_agents ga ON ga.group_id = g.id
            WHERE ga.agent_id = $1
            ORDER BY g.name
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| GroupRecord { id, name })
            .collect())
    }

    async fn find_agent_group(&self, agent_id: Uuid, group_id: Uuid) -> StoreResult<Option<GroupRecord>> {
        let row = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT g.id, g.name
            FROM groups g
            JOIN group_agents ga ON ga.group_id = g.id
            WHERE g.id = $1 AND ga.agent_id = $2
            "#,
        )
        .bind(group_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, name)| GroupRecord { id, name }))
    }

    async fn chats_in_group(&self, group_id: Uuid) -> StoreResult<Vec<BotChats>> {
        let rows = sqlx::query_as::<_, GroupChatRow>(
            r#"
            SELECT b.id AS bot_id, b.name AS bot_name, r.id AS request_id, r.theme,
                   (SELECT m.text FROM messages m
                    WHERE m.request_id = r.id
                    ORDER BY m.sended DESC
                    LIMIT 1) AS last_msg
            FROM group_bots gb
            JOIN bots b ON b.id = gb.bot_id
            LEFT JOIN requests r ON r.bot_id = b.id
            WHERE gb.group_id = $1
            ORDER BY b.name, b.id, r.created, r.id
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        // Rows arrive grouped by bot
        let mut listed: Vec<(Uuid, BotChats)> = Vec::new();
        for row in rows {
            if listed.last().map(|(id, _)| *id) != Some(row.bot_id) {
                listed.push((
                    row.bot_id,
                    BotChats {
                        bot_name: row.bot_name,
                        chats: Vec::new(),
                    },
                ));
            }
            if let (Some(request_id), Some(theme), Some((_, bot))) =
                (row.request_id, row.theme, listed.last_mut())
            {
                bot.chats.push(ChatSummary {
                    id: RoomId(request_id),
                    theme,
                    last_msg: row.last_msg,
                });
            }
        }

        Ok(listed.into_iter().map(|(_, bot)| bot).collect())
    }

    async fn room_info(&self, room_id: RoomId) -> StoreResult<Option<RoomInfo>> {
        let row = sqlx::query_as::<_, RoomInfoRow>(
            r#"
            SELECT r.id, c.name AS client_name, r.created, r.is_solved, r.theme, r.solved_by
            FROM requests r
            JOIN clients c ON c.id = r.client_id
            WHERE r.id = $1
            "#,
        )
        .bind(room_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RoomInfo {
            id: RoomId(r.id),
            client_name: r.client_name,
            created: r.created,
            is_solved: r.is_solved,
            theme: r.theme,
            solved_by: r.solved_by,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_open_request_and_lookup() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        let store = PgStore::new(pool);
        store.migrate().await.expect("Failed to migrate");

        let bot_id = Uuid::new_v4();
        let secret = Uuid::new_v4();
        sqlx::query("INSERT INTO bots (id, name, secret_key) VALUES ($1, 'test-bot', $2)")
            .bind(bot_id)
            .bind(secret)
            .execute(store.pool())
            .await
            .unwrap();

        let telegram_id = Uuid::new_v4().simple().to_string();
        let room = store
            .open_request(bot_id, &telegram_id, "Alice", "Billing question")
            .await
            .unwrap();
        let record = store.find_room(room).await.unwrap().unwrap();
        assert_eq!(record.bot_secret, secret);
        assert_eq!(record.client_external_id, telegram_id);

        let message = store.create_message(room, record.client_id, "hi").await.unwrap();
        let history = store.list_messages(room, None, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, message.id);
        assert_eq!(history[0].user_type, IdentityKind::EndUser);

        let info = store.room_info(room).await.unwrap().unwrap();
        assert_eq!(info.client_name, "Alice");
        assert_eq!(info.solved_by, None);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_client_may_share_username_with_agent() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        let store = PgStore::new(pool);
        store.migrate().await.expect("Failed to migrate");

        let shared_name = (Uuid::new_v4().as_u128() % 1_000_000_000_000).to_string();
        let agent_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, username, kind) VALUES ($1, $2, 'agent')")
            .bind(agent_id)
            .bind(&shared_name)
            .execute(store.pool())
            .await
            .unwrap();

        let bot_id = Uuid::new_v4();
        sqlx::query("INSERT INTO bots (id, name, secret_key) VALUES ($1, 'test-bot', $2)")
            .bind(bot_id)
            .bind(Uuid::new_v4())
            .execute(store.pool())
            .await
            .unwrap();

        let room = store
            .open_request(bot_id, &shared_name, "Bob", "Theme")
            .await
            .unwrap();
        assert!(store.find_room(room).await.unwrap().is_some());
    }
}
