//! WebSocket handler for Axum
//!
//! Authenticates the upgrade request, then drives one [`RoomConsumer`] for
//! the life of the socket.

use std::borrow::Cow;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        OriginalUri, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use supportdesk_shared::GroupEvent;
use tokio::sync::mpsc;

use crate::state::AppState;

use super::{
    authenticator::{ConnectionAuthenticator, ConnectionContext, HandshakeQuery, Rejection},
    consumer::RoomConsumer,
};

/// Room socket endpoint: `/ws/chat/<room_id>/?token=...` or `?secure_key=...`
///
/// The upgrade always completes so that a refused handshake can be closed
/// with an application close code the client can read.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: Option<Query<HandshakeQuery>>,
) -> Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let authenticator = ConnectionAuthenticator::new(app_state.verifier.clone(), app_state.gate.clone());

    match authenticator.authenticate(uri.path(), &query).await {
        Ok(context) => {
            tracing::info!(
                room_id = %context.room_id,
                user_id = %context.identity.id,
                "WebSocket connection upgrade requested"
            );
            ws.on_upgrade(move |socket| handle_socket(socket, context, app_state))
        }
        Err(rejection) => {
            tracing::warn!(
                code = rejection.code,
                reason = %rejection.reason,
                stage = ?rejection.stage,
                path = %uri.path(),
                "WebSocket handshake refused"
            );
            ws.on_upgrade(move |socket| refuse_socket(socket, rejection))
        }
    }
}

fn close_message(rejection: &Rejection) -> Message {
    Message::Close(Some(CloseFrame {
        code: rejection.code,
        reason: Cow::Owned(rejection.reason.clone()),
    }))
}

async fn refuse_socket(mut socket: WebSocket, rejection: Rejection) {
    if let Err(e) = socket.send(close_message(&rejection)).await {
        tracing::debug!(error = ?e, "Failed to send close frame");
    }
}

/// Handle an admitted connection
async fn handle_socket(socket: WebSocket, context: ConnectionContext, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Group events for this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<GroupEvent>();

    let mut consumer = RoomConsumer::new(
        context,
        app_state.bus.clone(),
        app_state.store.clone(),
        app_state.gate.clone(),
    );
    if let Err(rejection) = consumer.on_open(tx).await {
        let _ = sender.send(close_message(&rejection)).await;
        return;
    }
    let session_id = consumer.session_id();

    // Spawn task to push group events to the client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match RoomConsumer::on_group_event(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize group event");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                consumer.on_inbound_text(&text).await;
            }
            Ok(Message::Close(_)) => {
                // Keep reading so the close reply is flushed; the stream ends next
                tracing::debug!(session_id = %session_id, "WebSocket close frame received");
            }
            Ok(_) => {} // Ping/pong handled by axum, binary ignored
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = ?e, "WebSocket receive error");
                break;
            }
        }
    }

    tracing::info!(session_id = %session_id, room_id = %context.room_id, "WebSocket connection closing");
    consumer.on_close().await;
    send_task.abort();
}
