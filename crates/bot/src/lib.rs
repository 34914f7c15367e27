//! SupportDesk end-user client
//!
//! Opens tickets through the backend and keeps one resilient socket per
//! ticket, forwarding staff replies to the front end.

pub mod backend;
pub mod chat_storage;
pub mod config;
pub mod connector;
pub mod console;

pub use backend::{BackendClient, BackendError, CreatedRequest};
pub use chat_storage::{ChatStorage, StorageError, StoredChat};
pub use config::{BotConfig, BotConfigError};
pub use connector::{ConnectorError, MessageHandler, ResilientConnector, DEFAULT_RECONNECT_DELAY};
