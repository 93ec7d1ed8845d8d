//! In-memory store.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use spacelink_proto::Space;

use super::{CachedItem, LocalStore, QueuedOutbound, StoreError};

/// Store that lives as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    seq: AtomicU64,
    items: DashMap<String, (u64, CachedItem)>,
    queue: DashMap<String, (u64, QueuedOutbound)>,
    spaces: DashMap<(String, String), Space>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn insert_item(&self, item: &CachedItem) -> Result<bool, StoreError> {
        match self.items.entry(item.item_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert((self.next_seq(), item.clone()));
                Ok(true)
            }
        }
    }

    async fn contains_item(&self, item_id: &str) -> Result<bool, StoreError> {
        Ok(self.items.contains_key(item_id))
    }

    async fn items_by_node(&self, node: &str) -> Result<Vec<CachedItem>, StoreError> {
        let mut items: Vec<(u64, CachedItem)> = self
            .items
            .iter()
            .filter(|e| e.value().1.node == node)
            .map(|e| e.value().clone())
            .collect();
        items.sort_by_key(|(seq, _)| *seq);
        Ok(items.into_iter().map(|(_, item)| item).collect())
    }

    async fn delete_items_by_node(&self, node: &str) -> Result<u64, StoreError> {
        let before = self.items.len();
        self.items.retain(|_, (_, item)| item.node != node);
        Ok((before - self.items.len()) as u64)
    }

    async fn delete_all_items(&self) -> Result<u64, StoreError> {
        let count = self.items.len() as u64;
        self.items.clear();
        Ok(count)
    }

    async fn enqueue(&self, entry: &QueuedOutbound) -> Result<(), StoreError> {
        self.queue
            .insert(entry.local_id.clone(), (self.next_seq(), entry.clone()));
        Ok(())
    }

    async fn queued_for(&self, user: &str) -> Result<Vec<QueuedOutbound>, StoreError> {
        let mut entries: Vec<(u64, QueuedOutbound)> = self
            .queue
            .iter()
            .filter(|e| e.value().1.user == user)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, entry)| entry).collect())
    }

    async fn dequeue(&self, local_id: &str) -> Result<bool, StoreError> {
        Ok(self.queue.remove(local_id).is_some())
    }

    async fn clear_queue(&self, user: &str) -> Result<u64, StoreError> {
        let before = self.queue.len();
        self.queue.retain(|_, (_, entry)| entry.user != user);
        Ok((before - self.queue.len()) as u64)
    }

    async fn save_space(&self, user: &str, space: &Space) -> Result<(), StoreError> {
        self.spaces
            .insert((user.to_string(), space.id.clone()), space.clone());
        Ok(())
    }

    async fn delete_space(&self, user: &str, space_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .spaces
            .remove(&(user.to_string(), space_id.to_string()))
            .is_some())
    }

    async fn space(&self, user: &str, space_id: &str) -> Result<Option<Space>, StoreError> {
        Ok(self
            .spaces
            .get(&(user.to_string(), space_id.to_string()))
            .map(|s| s.clone()))
    }

    async fn spaces_for(&self, user: &str) -> Result<Vec<Space>, StoreError> {
        let mut spaces: Vec<Space> = self
            .spaces
            .iter()
            .filter(|e| e.key().0 == user)
            .map(|e| e.value().clone())
            .collect();
        spaces.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(spaces)
    }
}
