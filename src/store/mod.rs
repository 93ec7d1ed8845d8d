//! Local storage: item cache, offline outbound queue and space snapshots.
//!
//! The engines only see the [`LocalStore`] trait. [`SqliteStore`] keeps the
//! data across restarts; [`MemoryStore`] is for embedding and tests.

mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spacelink_proto::{DataObject, Space};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::{Database, SqliteStore};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A stored row could not be turned back into a value.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// An item delivered on, or fetched from, a pubsub node.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedItem {
    pub item_id: String,
    pub node: String,
    pub payload: DataObject,
    pub cached_at: DateTime<Utc>,
}

impl CachedItem {
    pub fn new(item_id: impl Into<String>, node: impl Into<String>, payload: DataObject) -> Self {
        Self {
            item_id: item_id.into(),
            node: node.into(),
            payload,
            cached_at: Utc::now(),
        }
    }
}

/// A publish deferred until the engine is online again.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOutbound {
    /// Id handed back to the caller when the item was queued.
    pub local_id: String,
    pub space_id: String,
    /// Bare address of the user who queued it.
    pub user: String,
    pub payload: DataObject,
    pub queued_at: DateTime<Utc>,
}

/// Storage backing the engines.
///
/// Item ids are unique across nodes. Queue entries come back in the order
/// they were enqueued.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert an item unless its id is already cached.
    ///
    /// Returns `true` if the item was inserted. Check and insert are one
    /// atomic step.
    async fn insert_item(&self, item: &CachedItem) -> Result<bool, StoreError>;

    async fn contains_item(&self, item_id: &str) -> Result<bool, StoreError>;

    /// Items of a node in the order they were cached.
    async fn items_by_node(&self, node: &str) -> Result<Vec<CachedItem>, StoreError>;

    async fn delete_items_by_node(&self, node: &str) -> Result<u64, StoreError>;

    async fn delete_all_items(&self) -> Result<u64, StoreError>;

    async fn enqueue(&self, entry: &QueuedOutbound) -> Result<(), StoreError>;

    /// Queue entries of `user`, oldest first.
    async fn queued_for(&self, user: &str) -> Result<Vec<QueuedOutbound>, StoreError>;

    /// Remove one queue entry. Returns `false` if it was already gone.
    async fn dequeue(&self, local_id: &str) -> Result<bool, StoreError>;

    async fn clear_queue(&self, user: &str) -> Result<u64, StoreError>;

    /// Insert or replace the snapshot of a space for `user`.
    async fn save_space(&self, user: &str, space: &Space) -> Result<(), StoreError>;

    async fn delete_space(&self, user: &str, space_id: &str) -> Result<bool, StoreError>;

    async fn space(&self, user: &str, space_id: &str) -> Result<Option<Space>, StoreError>;

    async fn spaces_for(&self, user: &str) -> Result<Vec<Space>, StoreError>;

    /// Replace every snapshot of `user` with `spaces`.
    async fn replace_spaces(&self, user: &str, spaces: &[Space]) -> Result<(), StoreError> {
        for existing in self.spaces_for(user).await? {
            if !spaces.iter().any(|s| s.id == existing.id) {
                self.delete_space(user, &existing.id).await?;
            }
        }
        for space in spaces {
            self.save_space(user, space).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::{BTreeMap, BTreeSet};

    use spacelink_proto::{
        DataObject, DataObjectBuilder, Persistence, Role, Space, SpaceChannel, SpaceType,
    };

    pub fn object(id: &str) -> DataObject {
        DataObjectBuilder::new("reading", "urn:example:sensor")
            .attribute("id", id)
            .attribute("timestamp", "2024-05-01T10:00:00Z")
            .content("21.5")
            .build()
    }

    pub fn space(id: &str, user: &str) -> Space {
        let mut members = BTreeMap::new();
        members.insert(user.to_string(), Role::Moderator);
        members.insert("bob@example.org".to_string(), Role::Member);
        Space {
            id: id.to_string(),
            name: format!("space {}", id),
            domain: "spaces.example.org".to_string(),
            space_type: SpaceType::Team,
            channels: vec![SpaceChannel::pubsub(format!("spaces#{}", id), "pubsub.example.org")],
            members,
            persistence: Persistence::On,
            data_models: BTreeSet::new(),
        }
    }
}
