//! Bearer session extractor for staff HTTP endpoints

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use supportdesk_shared::{Identity, IdentityKind};

use super::AuthError;
use crate::{error::ApiError, state::AppState};

/// Present in a handler means the request carried a valid staff session token
#[derive(Debug, Clone, Copy)]
pub struct StaffSession(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for StaffSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let identity = state
            .verifier
            .verify_session(token)
            .await
            .map_err(|e| match e {
                AuthError::Store(err) => ApiError::from(err),
                _ => ApiError::InvalidToken,
            })?;

        if identity.kind != IdentityKind::Staff {
            return Err(ApiError::Forbidden);
        }

        Ok(StaffSession(identity))
    }
}
