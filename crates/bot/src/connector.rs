//! Long-lived room connections for the end-user side
//!
//! Each room gets one supervising task that owns its socket. The task
//! connects, forwards staff messages to a [`MessageHandler`], and after any
//! disconnect or failure closes cleanly and retries after a fixed delay,
//! forever, until the room is reconnected or [`ResilientConnector::close_all`]
//! runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use supportdesk_shared::secure::generate_proxy_token;
use supportdesk_shared::{ChatMessage, InboundFrame, RoomId, SharedError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How long to wait for the server's close reply during teardown
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Receives staff messages for rooms this client is connected to
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, room_id: RoomId, message: ChatMessage);
}

#[async_trait]
impl MessageHandler for mpsc::UnboundedSender<ChatMessage> {
    async fn handle(&self, room_id: RoomId, message: ChatMessage) {
        if self.send(message).is_err() {
            tracing::debug!(room_id = %room_id, "Message receiver dropped");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Invalid room URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Unsupported backend scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Proxy token generation failed: {0}")]
    Token(#[from] SharedError),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

struct RoomTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    base_url: Url,
    issuer_secret: String,
    reconnect_delay: Duration,
    tasks: Mutex<HashMap<RoomId, RoomTask>>,
    sockets: Mutex<HashMap<RoomId, Arc<Mutex<WsSink>>>>,
}

/// At most one live connection per room
#[derive(Clone)]
pub struct ResilientConnector {
    inner: Arc<Inner>,
}

impl ResilientConnector {
    pub fn new(base_url: Url, issuer_secret: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                base_url,
                issuer_secret: issuer_secret.into(),
                reconnect_delay,
                tasks: Mutex::new(HashMap::new()),
                sockets: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Socket URL for a room, carrying the end-user's proxy token
    pub fn room_url(&self, room_id: RoomId, end_user_id: &str) -> Result<Url, ConnectorError> {
        let secure_key = generate_proxy_token(&self.inner.issuer_secret, end_user_id)?;
        let mut url = self.inner.base_url.join(&format!("ws/chat/{}/", room_id))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConnectorError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ConnectorError::UnsupportedScheme(scheme.to_string()))?;
        url.query_pairs_mut().append_pair("secure_key", &secure_key);
        Ok(url)
    }

    /// Start (or restart) the connection for a room
    ///
    /// Any existing task for the room is cancelled and awaited first, so its
    /// socket is closed before the replacement opens. The task map stays
    /// locked throughout so concurrent calls cannot both spawn.
    pub async fn connect<H: MessageHandler>(
        &self,
        room_id: RoomId,
        end_user_id: &str,
        handler: Arc<H>,
    ) -> Result<(), ConnectorError> {
        let url = self.room_url(room_id, end_user_id)?;

        let mut tasks = self.inner.tasks.lock().await;
        if let Some(previous) = tasks.remove(&room_id) {
            retire(room_id, previous).await;
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(supervise(inner, room_id, url, handler, cancel_rx));
        tasks.insert(room_id, RoomTask { cancel, handle });

        tracing::debug!(room_id = %room_id, "Room task started");
        Ok(())
    }

    /// Send a text message over the room's live socket
    ///
    /// Returns false when the room has no open socket or the write fails.
    pub async fn send(&self, room_id: RoomId, text: &str) -> bool {
        let sink = self.inner.sockets.lock().await.get(&room_id).cloned();
        let Some(sink) = sink else {
            tracing::warn!(room_id = %room_id, "No active WebSocket for chat");
            return false;
        };

        let frame = match serde_json::to_string(&InboundFrame::new(text)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize outbound frame");
                return false;
            }
        };

        let mut sink = sink.lock().await;
        match sink.send(Message::Text(frame)).await {
            Ok(()) => {
                tracing::debug!(room_id = %room_id, "Sent message");
                true
            }
            Err(e) => {
                tracing::warn!(room_id = %room_id, error = %e, "Failed to send message");
                false
            }
        }
    }

    /// Cancel every room task and wait for their sockets to close
    pub async fn close_all(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        for task in tasks.values() {
            let _ = task.cancel.send(true);
        }
        for (room_id, task) in tasks.drain() {
            retire(room_id, task).await;
        }
        tracing::info!("All room connections closed");
    }

    /// Whether the room currently has an open socket
    pub async fn is_connected(&self, room_id: RoomId) -> bool {
        self.inner.sockets.lock().await.contains_key(&room_id)
    }

    /// Rooms with a running task, connected or retrying
    pub async fn active_rooms(&self) -> Vec<RoomId> {
        self.inner.tasks.lock().await.keys().copied().collect()
    }
}

/// Cancel a room task and wait until its socket is closed
async fn retire(room_id: RoomId, task: RoomTask) {
    let _ = task.cancel.send(true);
    if let Err(e) = task.handle.await {
        tracing::warn!(room_id = %room_id, error = %e, "Room task ended abnormally");
    }
    tracing::debug!(room_id = %room_id, "Room task retired");
}

/// Resolves once cancellation is requested or the owner is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        let requested = *cancel.borrow_and_update();
        if requested || cancel.changed().await.is_err() {
            return;
        }
    }
}

enum SessionEnd {
    Cancelled,
    Disconnected,
}

async fn supervise<H: MessageHandler>(
    inner: Arc<Inner>,
    room_id: RoomId,
    url: Url,
    handler: Arc<H>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match run_session(&inner, room_id, &url, handler.as_ref(), &mut cancel).await {
            Ok(SessionEnd::Cancelled) => break,
            Ok(SessionEnd::Disconnected) => {
                tracing::info!(room_id = %room_id, "WebSocket closed by server");
            }
            Err(e) => {
                tracing::warn!(room_id = %room_id, attempt, error = %e, "WebSocket connection failed");
            }
        }

        tracing::debug!(
            room_id = %room_id,
            delay_ms = inner.reconnect_delay.as_millis() as u64,
            "Reconnecting"
        );
        tokio::select! {
            _ = cancelled(&mut cancel) => break,
            _ = tokio::time::sleep(inner.reconnect_delay) => {}
        }
    }
    tracing::debug!(room_id = %room_id, "Room task stopped");
}

/// One connection attempt, from connect to teardown
async fn run_session<H: MessageHandler>(
    inner: &Inner,
    room_id: RoomId,
    url: &Url,
    handler: &H,
    cancel: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, ConnectorError> {
    let (ws, _response) = tokio::select! {
        _ = cancelled(cancel) => return Ok(SessionEnd::Cancelled),
        result = tokio_tungstenite::connect_async(url.as_str()) => result?,
    };
    let (sink, mut stream) = ws.split();
    let sink = Arc::new(Mutex::new(sink));
    inner.sockets.lock().await.insert(room_id, Arc::clone(&sink));
    tracing::info!(room_id = %room_id, "WebSocket connected");

    let end = loop {
        tokio::select! {
            _ = cancelled(cancel) => break Ok(SessionEnd::Cancelled),
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => dispatch(room_id, &text, handler).await,
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(room_id = %room_id, frame = ?frame, "Close frame received");
                    break Ok(SessionEnd::Disconnected);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(ConnectorError::from(e)),
                None => break Ok(SessionEnd::Disconnected),
            },
        }
    };

    inner.sockets.lock().await.remove(&room_id);
    teardown(room_id, &sink, stream).await;
    end
}

/// Forward staff messages; everything else is dropped
async fn dispatch<H: MessageHandler>(room_id: RoomId, text: &str, handler: &H) {
    match ChatMessage::parse(text) {
        Ok(message) if message.is_from_staff() => handler.handle(room_id, message).await,
        Ok(_) => {}
        Err(e) => {
            tracing::error!(room_id = %room_id, error = %e, "Invalid JSON from chat socket");
        }
    }
}

/// Close our side and wait briefly for the peer's close reply
async fn teardown(room_id: RoomId, sink: &Mutex<WsSink>, mut stream: SplitStream<WsStream>) {
    if let Err(e) = sink.lock().await.close().await {
        tracing::debug!(room_id = %room_id, error = %e, "Close on an already closed socket");
        return;
    }

    let drained = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
        while let Some(Ok(msg)) = stream.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::debug!(room_id = %room_id, "Peer did not answer close in time");
    }
}
