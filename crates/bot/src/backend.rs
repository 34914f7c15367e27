//! HTTP client for the backend's bot endpoints

use serde::{Deserialize, Serialize};
use supportdesk_shared::RoomId;
use url::Url;
use uuid::Uuid;

const CREATE_REQUEST_PATH: &str = "api/v1/bot/create-request/";

#[derive(Debug, Serialize)]
struct CreateRequestBody<'a> {
    telegram_id: i64,
    name: &'a str,
    theme: &'a str,
}

/// Ticket opened for an end-user
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedRequest {
    pub telegram_id: i64,
    pub chat_id: RoomId,
}

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    security_key: Uuid,
}

impl BackendClient {
    pub fn new(base_url: Url, security_key: Uuid) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            security_key,
        }
    }

    /// Open a ticket for an end-user
    pub async fn create_request(
        &self,
        telegram_id: i64,
        name: &str,
        theme: &str,
    ) -> Result<CreatedRequest, BackendError> {
        let url = self.base_url.join(CREATE_REQUEST_PATH)?;
        let response = self
            .http
            .post(url.clone())
            .header("X-Bot-Token", self.security_key.to_string())
            .json(&CreateRequestBody {
                telegram_id,
                name,
                theme,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(url = %url, status = %status, body = %body, "create-request rejected");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedRequest = response.json().await?;
        tracing::info!(chat_id = %created.chat_id, telegram_id, "Ticket created");
        Ok(created)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Backend answered {status}: {body}")]
    Status { status: u16, body: String },
}
