//! API routes

pub mod auth;
pub mod bot;
pub mod chats;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Bot and staff API routes - under /api/v1
    let api_routes = Router::new()
        .route("/bot/create-request/", post(bot::create_request))
        .route("/auth/login/", post(auth::login))
        .route("/chats/get-group-list/", get(chats::get_group_list))
        .route("/chats/get-chat-list/", post(chats::get_chat_list))
        .route("/chats/get-chat-messages/", post(chats::get_chat_messages));

    // Room sockets authenticate themselves during the handshake
    let ws_routes = Router::new().route("/ws/chat/*path", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_routes)
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
