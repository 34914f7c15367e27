//! Local record of the tickets this bot has opened
//!
//! Stored as `{"chats": [{"id", "user_id", "is_solved"}]}` so an end-user's
//! open ticket survives a restart.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use supportdesk_shared::RoomId;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChat {
    pub id: RoomId,
    /// Telegram id of the end-user
    pub user_id: i64,
    pub is_solved: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatFile {
    #[serde(default)]
    chats: Vec<StoredChat>,
}

pub struct ChatStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl ChatStorage {
    /// Open the storage file, creating an empty one if needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if tokio::fs::metadata(&path).await.is_err() {
            let empty = serde_json::to_vec_pretty(&ChatFile::default())?;
            tokio::fs::write(&path, empty).await?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> Result<Vec<StoredChat>, StorageError> {
        let raw = tokio::fs::read(&self.path).await?;
        let file: ChatFile = serde_json::from_slice(&raw)?;
        Ok(file.chats)
    }

    async fn save(&self, chats: Vec<StoredChat>) -> Result<(), StorageError> {
        let raw = serde_json::to_vec_pretty(&ChatFile { chats })?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    /// Record a newly opened chat. Known ids are left untouched.
    pub async fn add_chat(&self, id: RoomId, user_id: i64) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut chats = self.load().await?;
        if chats.iter().any(|c| c.id == id) {
            return Ok(());
        }
        chats.push(StoredChat {
            id,
            user_id,
            is_solved: false,
        });
        self.save(chats).await
    }

    /// First unsolved chat of an end-user
    pub async fn find_chat(&self, user_id: i64) -> Result<Option<StoredChat>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|c| c.user_id == user_id && !c.is_solved))
    }

    /// Returns false if the chat is unknown
    pub async fn mark_solved(&self, id: RoomId) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().await;
        let mut chats = self.load().await?;
        let Some(chat) = chats.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        chat.is_solved = true;
        self.save(chats).await?;
        Ok(true)
    }

    /// Returns false if the chat is unknown
    pub async fn remove_chat(&self, id: RoomId) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().await;
        let mut chats = self.load().await?;
        let before = chats.len();
        chats.retain(|c| c.id != id);
        if chats.len() == before {
            return Ok(false);
        }
        self.save(chats).await?;
        Ok(true)
    }

    pub async fn all_chats(&self) -> Result<Vec<StoredChat>, StorageError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Chat storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Chat storage is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("chat-storage-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_chat_lifecycle() {
        let path = temp_path();
        let storage = ChatStorage::open(&path).await.unwrap();
        assert!(storage.all_chats().await.unwrap().is_empty());

        let first = RoomId::new();
        let second = RoomId::new();
        storage.add_chat(first, 42).await.unwrap();
        storage.add_chat(first, 42).await.unwrap();
        storage.add_chat(second, 42).await.unwrap();
        assert_eq!(storage.all_chats().await.unwrap().len(), 2);

        assert_eq!(storage.find_chat(42).await.unwrap().unwrap().id, first);
        assert!(storage.find_chat(43).await.unwrap().is_none());

        assert!(storage.mark_solved(first).await.unwrap());
        assert_eq!(storage.find_chat(42).await.unwrap().unwrap().id, second);

        assert!(storage.remove_chat(second).await.unwrap());
        assert!(!storage.remove_chat(second).await.unwrap());
        assert!(storage.find_chat(42).await.unwrap().is_none());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_contents_survive_reopen() {
        let path = temp_path();
        let room = RoomId::new();
        {
            let storage = ChatStorage::open(&path).await.unwrap();
            storage.add_chat(room, 7).await.unwrap();
        }

        let reopened = ChatStorage::open(&path).await.unwrap();
        assert_eq!(
            reopened.all_chats().await.unwrap(),
            vec![StoredChat {
                id: room,
                user_id: 7,
                is_solved: false
            }]
        );

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["chats"][0]["user_id"], 7);

        let _ = std::fs::remove_file(path);
    }
}
