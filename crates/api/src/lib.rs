//! SupportDesk API Library
//!
//! Ticket creation for bots, staff login and history, and the real-time
//! room transport that relays messages between staff and end-users.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
