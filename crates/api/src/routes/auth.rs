//! Staff authentication routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    auth::agent_password_matches,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub expires_in: i64,
}

/// Exchange staff username and password for a session token
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let Some(agent) = state.store.find_agent_by_username(&req.username).await? else {
        tracing::info!(username = %req.username, "login: Unknown account");
        return Err(ApiError::InvalidCredentials);
    };

    let valid = agent_password_matches(&agent, &req.password).map_err(|e| {
        tracing::error!(error = ?e, agent_id = %agent.id, "login: Stored hash unreadable");
        ApiError::Internal
    })?;
    if !valid {
        tracing::info!(agent_id = %agent.id, active = agent.is_active, "login: Refused");
        return Err(ApiError::InvalidCredentials);
    }

    let access = state.jwt.generate_access_token(agent.id).map_err(|e| {
        tracing::error!(error = ?e, "login: Token generation failed");
        ApiError::Internal
    })?;

    tracing::info!(agent_id = %agent.id, "login: Success");
    Ok(Json(LoginResponse {
        access,
        expires_in: state.jwt.access_token_expiry_seconds(),
    }))
}
