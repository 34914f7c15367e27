//! Redis-backed broadcast bus for multi-process deployments
//!
//! Publishes go to the Redis channel named after the group. Each process
//! holds one pattern subscription and hands every received event to its
//! own [`LocalBus`], so a room's members may be spread across processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use supportdesk_shared::GroupEvent;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::bus::{BroadcastBus, BusError, GroupMember, LocalBus};

/// Pattern matching every room group
const GROUP_PATTERN: &str = "chat_*";

/// Pause before re-subscribing after the subscription drops
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// How long `connect` waits for the first subscription
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RedisBus {
    local: Arc<LocalBus>,
    publisher: ConnectionManager,
    /// Set while the pattern subscription is live
    subscribed: Arc<AtomicBool>,
    listener: JoinHandle<()>,
}

impl RedisBus {
    /// Connect the publisher and wait until the subscription listener is live
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        let local = Arc::new(LocalBus::new());
        let subscribed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let listener = tokio::spawn(listen(
            client,
            Arc::clone(&local),
            Arc::clone(&subscribed),
            ready_tx,
        ));

        // Local members only hear events that come back through the subscription
        if !matches!(tokio::time::timeout(SUBSCRIBE_TIMEOUT, ready_rx).await, Ok(Ok(()))) {
            listener.abort();
            tracing::error!(pattern = GROUP_PATTERN, "Redis subscription did not come up");
            return Err(BusError::NotSubscribed);
        }

        tracing::info!("Redis broadcast bus connected");
        Ok(Self {
            local,
            publisher,
            subscribed,
            listener,
        })
    }
}

impl Drop for RedisBus {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn ensure_subscribed(subscribed: &AtomicBool) -> Result<(), BusError> {
    if subscribed.load(Ordering::Acquire) {
        Ok(())
    } else {
        Err(BusError::NotSubscribed)
    }
}

#[async_trait]
impl BroadcastBus for RedisBus {
    async fn join(&self, group: &str, member: GroupMember) -> Result<(), BusError> {
        self.local.join(group, member).await
    }

    async fn leave(&self, group: &str, session_id: Uuid) {
        self.local.leave(group, session_id).await
    }

    /// Fails while the subscription is down, since the event would not reach
    /// this process's own members
    async fn publish(&self, group: &str, event: GroupEvent) -> Result<(), BusError> {
        ensure_subscribed(&self.subscribed)?;
        let payload = serde_json::to_string(&event)?;
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(group, payload).await?;
        tracing::debug!(group = %group, subscribers = receivers, "Published event to Redis");
        Ok(())
    }
}

/// Keep a pattern subscription alive for the life of the process
///
/// `ready` fires once, the first time the subscription is established.
async fn listen(
    client: redis::Client,
    local: Arc<LocalBus>,
    subscribed: Arc<AtomicBool>,
    ready: oneshot::Sender<()>,
) {
    let mut ready = Some(ready);
    loop {
        let result = forward_events(&client, &local, &subscribed, &mut ready).await;
        subscribed.store(false, Ordering::Release);
        match result {
            Ok(()) => tracing::warn!("Redis subscription ended"),
            Err(e) => tracing::warn!(error = %e, "Redis subscription failed"),
        }
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}

async fn forward_events(
    client: &redis::Client,
    local: &LocalBus,
    subscribed: &AtomicBool,
    ready: &mut Option<oneshot::Sender<()>>,
) -> Result<(), BusError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(GROUP_PATTERN).await?;
    subscribed.store(true, Ordering::Release);
    if let Some(ready) = ready.take() {
        let _ = ready.send(());
    }
    tracing::info!(pattern = GROUP_PATTERN, "Subscribed to room groups");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let group = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, group = %group, "Unreadable Redis payload");
                continue;
            }
        };

        match serde_json::from_str::<GroupEvent>(&payload) {
            Ok(event) => {
                local.deliver(&group, event).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, group = %group, "Dropping malformed group event");
            }
        }
    }

    Ok(())
}
