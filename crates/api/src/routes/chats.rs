//! Staff chat browsing routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use supportdesk_shared::{ChatMessage, RoomId};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::StaffSession,
    error::{ApiError, ApiResult},
    state::AppState,
    store::{BotChats, GroupRecord, RoomInfo, HISTORY_PAGE_SIZE},
};

/// Shown as `last_msg` for a ticket nobody has written in yet
pub const NO_MESSAGES: &str = "No messages";

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
}

impl From<GroupRecord> for GroupSummary {
    fn from(group: GroupRecord) -> Self {
        Self {
            id: group.id,
            name: group.name,
        }
    }
}

/// Groups the caller is a member of
pub async fn get_group_list(
    State(state): State<AppState>,
    StaffSession(identity): StaffSession,
) -> ApiResult<Json<Vec<GroupSummary>>> {
    let groups = state.store.groups_for_agent(identity.id).await?;
    Ok(Json(groups.into_iter().map(GroupSummary::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ChatListRequest {
    pub group_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatListItem {
    pub id: RoomId,
    pub theme: String,
    pub last_msg: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BotChatList {
    pub bot_name: String,
    pub chats: Vec<ChatListItem>,
}

impl From<BotChats> for BotChatList {
    fn from(bot: BotChats) -> Self {
        Self {
            bot_name: bot.bot_name,
            chats: bot
                .chats
                .into_iter()
                .map(|chat| ChatListItem {
                    id: chat.id,
                    theme: chat.theme,
                    last_msg: chat.last_msg.unwrap_or_else(|| NO_MESSAGES.to_string()),
                })
                .collect(),
        }
    }
}

/// Tickets of every bot in one of the caller's groups
///
/// A group the caller does not belong to is reported as missing.
pub async fn get_chat_list(
    State(state): State<AppState>,
    StaffSession(identity): StaffSession,
    Json(req): Json<ChatListRequest>,
) -> ApiResult<Json<Vec<BotChatList>>> {
    let group = state
        .store
        .find_agent_group(identity.id, req.group_id)
        .await?
        .ok_or(ApiError::NotFound("Group"))?;

    let bots = state.store.chats_in_group(group.id).await?;
    Ok(Json(bots.into_iter().map(BotChatList::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ChatMessagesRequest {
    pub chat_id: RoomId,
    #[serde(default)]
    pub message_id: Option<Uuid>,
    #[serde(default)]
    pub include_info: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: RoomId,
    pub client_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub is_solved: bool,
    pub theme: String,
    /// Staff member who closed the ticket
    pub solved_by: Option<Uuid>,
}

impl From<RoomInfo> for ChatInfo {
    fn from(info: RoomInfo) -> Self {
        Self {
            id: info.id,
            client_name: info.client_name,
            created: info.created,
            is_solved: info.is_solved,
            theme: info.theme,
            solved_by: info.solved_by,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessagesResponse {
    /// Present only when `include_info` was requested
    pub chat_info: Option<ChatInfo>,
    pub messages: Vec<ChatMessage>,
}

/// One page of room history, oldest first, older than `message_id` if given
pub async fn get_chat_messages(
    State(state): State<AppState>,
    StaffSession(identity): StaffSession,
    Json(req): Json<ChatMessagesRequest>,
) -> ApiResult<Json<ChatMessagesResponse>> {
    if !state.gate.can_join(&identity, req.chat_id).await {
        return Err(ApiError::Forbidden);
    }

    let messages = state
        .store
        .list_messages(req.chat_id, req.message_id, HISTORY_PAGE_SIZE)
        .await?;

    let chat_info = if req.include_info {
        let info = state
            .store
            .room_info(req.chat_id)
            .await?
            .ok_or(ApiError::NotFound("Chat"))?;
        Some(ChatInfo::from(info))
    } else {
        None
    };

    Ok(Json(ChatMessagesResponse { chat_info, messages }))
}
