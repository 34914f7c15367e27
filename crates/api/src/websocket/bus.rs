//! Group-addressed publish/subscribe
//!
//! A group is named after a room (`chat_<room_id>`). Every member joined
//! to a group receives one copy of every event published to it, in the
//! order the bus accepted the publishes.

use std::collections::HashMap;

use async_trait::async_trait;
use supportdesk_shared::GroupEvent;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Channel a member's socket writer drains
pub type EventSender = mpsc::UnboundedSender<GroupEvent>;

/// One connection's subscription to a group
#[derive(Debug, Clone)]
pub struct GroupMember {
    /// Unique session ID of the owning connection
    pub session_id: Uuid,
    sender: EventSender,
}

impl GroupMember {
    pub fn new(session_id: Uuid, sender: EventSender) -> Self {
        Self { session_id, sender }
    }

    /// Returns Err if the owning connection has gone away
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    fn deliver(&self, event: GroupEvent) -> Result<(), mpsc::error::SendError<GroupEvent>> {
        self.sender.send(event)
    }
}

#[async_trait]
pub trait BroadcastBus: Send + Sync {
    async fn join(&self, group: &str, member: GroupMember) -> Result<(), BusError>;

    /// Remove a member. Unknown groups and members are ignored.
    async fn leave(&self, group: &str, session_id: Uuid);

    async fn publish(&self, group: &str, event: GroupEvent) -> Result<(), BusError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Not subscribed to room events")]
    NotSubscribed,
}

/// In-process bus: groups are a map of member lists
pub struct LocalBus {
    groups: RwLock<HashMap<String, Vec<GroupMember>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Fan an event out to every current member of a group
    ///
    /// Holds the write lock for the whole fan-out so concurrent publishers
    /// cannot interleave. Members whose connection is gone are skipped.
    pub async fn deliver(&self, group: &str, event: GroupEvent) -> usize {
        let groups = self.groups.write().await;
        let Some(members) = groups.get(group) else {
            tracing::debug!(group = %group, "No members in group - event dropped");
            return 0;
        };

        let mut success_count = 0;
        let mut failed_count = 0;
        for member in members {
            match member.deliver(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        session_id = %member.session_id,
                        "Failed to deliver event to member (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            group = %group,
            recipients = success_count,
            failed = failed_count,
            "Delivered event to group"
        );
        success_count
    }

    /// Number of members joined to a group
    pub async fn group_size(&self, group: &str) -> usize {
        let groups = self.groups.read().await;
        groups.get(group).map(|v| v.len()).unwrap_or(0)
    }

    /// Number of groups with at least one member
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastBus for LocalBus {
    async fn join(&self, group: &str, member: GroupMember) -> Result<(), BusError> {
        let mut groups = self.groups.write().await;
        let session_id = member.session_id;
        let members = groups.entry(group.to_string()).or_default();
        members.retain(|m| m.session_id != session_id);
        members.push(member);

        tracing::debug!(
            group = %group,
            session_id = %session_id,
            group_size = members.len(),
            "Member joined group"
        );
        Ok(())
    }

    async fn leave(&self, group: &str, session_id: Uuid) {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(group) {
            members.retain(|m| m.session_id != session_id);

            if members.is_empty() {
                groups.remove(group);
                tracing::debug!(group = %group, "Removed empty group");
            } else {
                tracing::debug!(
                    group = %group,
                    session_id = %session_id,
                    group_size = members.len(),
                    "Member left group"
                );
            }
        }
    }

    async fn publish(&self, group: &str, event: GroupEvent) -> Result<(), BusError> {
        self.deliver(group, event).await;
        Ok(())
    }
}
