//! Error types for SupportDesk

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("HMAC initialization failed")]
    HmacInit,

    #[error("Malformed proxy token")]
    MalformedToken,

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
}
