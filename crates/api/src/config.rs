//! Application configuration

use std::env;

/// Which broadcast bus backs room fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastBackend {
    /// Single-process, in-memory groups
    Memory,
    /// Redis pub/sub shared by every server process
    Redis,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Broadcast bus
    pub broadcast_backend: BroadcastBackend,
    pub redis_url: String,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Broadcast bus
            broadcast_backend: match env::var("BROADCAST_BACKEND")
                .unwrap_or_else(|_| "memory".to_string())
                .to_ascii_lowercase()
                .as_str()
            {
                "memory" => BroadcastBackend::Memory,
                "redis" => BroadcastBackend::Redis,
                _ => {
                    return Err(ConfigError::Invalid(
                        "BROADCAST_BACKEND must be either 'memory' or 'redis'",
                    ))
                }
            },
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
