//! Endpoints called by bot front ends
//!
//! Bots authenticate with their issuer secret in the `X-Bot-Token` header.

use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use supportdesk_shared::RoomId;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    store::BotRecord,
};

pub const BOT_TOKEN_HEADER: &str = "X-Bot-Token";

/// Bot resolved from the `X-Bot-Token` header
#[derive(Debug, Clone)]
pub struct AuthenticatedBot(pub BotRecord);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthenticatedBot {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(BOT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        let secret: Uuid = raw.parse().map_err(|_| ApiError::InvalidToken)?;
        let bot = state
            .store
            .find_bot_by_secret(secret)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        Ok(AuthenticatedBot(bot))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestInput {
    pub telegram_id: i64,
    pub name: String,
    pub theme: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRequestOutput {
    pub telegram_id: i64,
    pub chat_id: RoomId,
}

/// Open a ticket for an end-user, creating the end-user on first contact
pub async fn create_request(
    State(state): State<AppState>,
    AuthenticatedBot(bot): AuthenticatedBot,
    Json(req): Json<CreateRequestInput>,
) -> ApiResult<(StatusCode, Json<CreateRequestOutput>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }
    if req.theme.trim().is_empty() {
        return Err(ApiError::Validation("theme must not be empty".to_string()));
    }

    let chat_id = state
        .store
        .open_request(bot.id, &req.telegram_id.to_string(), &req.name, &req.theme)
        .await?;

    tracing::info!(
        bot_id = %bot.id,
        telegram_id = req.telegram_id,
        chat_id = %chat_id,
        "Opened support request"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateRequestOutput {
            telegram_id: req.telegram_id,
            chat_id,
        }),
    ))
}
