//! Bot configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::connector::DEFAULT_RECONNECT_DELAY;

/// Bot configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Backend base URL, always ending in `/`
    pub backend_url: Url,
    /// Issuer secret shared with the backend
    pub api_security_key: Uuid,
    pub reconnect_delay: Duration,
    pub chat_storage_path: PathBuf,

    // End-user this console speaks for
    pub telegram_id: i64,
    pub display_name: String,
}

impl BotConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BotConfigError> {
        let backend_url = env::var("BACKEND_URL").map_err(|_| BotConfigError::Missing("BACKEND_URL"))?;
        let backend_url = normalize_base_url(&backend_url)
            .ok_or(BotConfigError::Invalid("BACKEND_URL must be an http(s) URL"))?;

        Ok(Self {
            backend_url,
            api_security_key: env::var("API_SECURITY_KEY")
                .map_err(|_| BotConfigError::Missing("API_SECURITY_KEY"))?
                .parse()
                .map_err(|_| BotConfigError::Invalid("API_SECURITY_KEY must be a UUID"))?,
            reconnect_delay: env::var("RECONNECT_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RECONNECT_DELAY),
            chat_storage_path: env::var("CHAT_STORAGE_PATH")
                .unwrap_or_else(|_| "chat_storage.json".to_string())
                .into(),
            telegram_id: env::var("TELEGRAM_ID")
                .map_err(|_| BotConfigError::Missing("TELEGRAM_ID"))?
                .parse()
                .map_err(|_| BotConfigError::Invalid("TELEGRAM_ID must be an integer"))?,
            display_name: env::var("DISPLAY_NAME").unwrap_or_else(|_| "Console user".to_string()),
        })
    }
}

/// Parse a base URL and make sure relative joins land under it
pub fn normalize_base_url(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Some(url)
}

#[derive(Debug, thiserror::Error)]
pub enum BotConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
