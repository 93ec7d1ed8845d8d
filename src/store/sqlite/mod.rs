//! SQLite-backed store.

mod items;
mod outbox;
mod spaces;

pub use items::ItemRepository;
pub use outbox::OutboxRepository;
pub use spaces::SpaceRepository;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spacelink_proto::Space;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use super::{CachedItem, LocalStore, QueuedOutbound, StoreError};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open a database, running migrations if needed.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            // Named per call: a plain shared memory database would collide
            // across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:spacelink-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create store directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Store opened");

        Self::run_migrations(&pool).await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        let integrity: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;
        if integrity != "ok" {
            tracing::error!(integrity_check = %integrity, "Store integrity check failed");
            return Err(StoreError::Corrupt(format!(
                "integrity check failed: {}",
                integrity
            )));
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Store migrations checked/applied");
        Ok(())
    }

    pub fn items(&self) -> ItemRepository<'_> {
        ItemRepository::new(&self.pool)
    }

    pub fn outbox(&self) -> OutboxRepository<'_> {
        OutboxRepository::new(&self.pool)
    }

    pub fn spaces(&self) -> SpaceRepository<'_> {
        SpaceRepository::new(&self.pool)
    }
}

pub(super) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(super) fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", millis)))
}

/// [`LocalStore`] over a [`Database`].
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::new(path).await?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn insert_item(&self, item: &CachedItem) -> Result<bool, StoreError> {
        self.db.items().insert(item).await
    }

    async fn contains_item(&self, item_id: &str) -> Result<bool, StoreError> {
        self.db.items().contains(item_id).await
    }

    async fn items_by_node(&self, node: &str) -> Result<Vec<CachedItem>, StoreError> {
        self.db.items().by_node(node).await
    }

    async fn delete_items_by_node(&self, node: &str) -> Result<u64, StoreError> {
        self.db.items().delete_by_node(node).await
    }

    async fn delete_all_items(&self) -> Result<u64, StoreError> {
        self.db.items().delete_all().await
    }

    async fn enqueue(&self, entry: &QueuedOutbound) -> Result<(), StoreError> {
        self.db.outbox().push(entry).await
    }

    async fn queued_for(&self, user: &str) -> Result<Vec<QueuedOutbound>, StoreError> {
        self.db.outbox().for_user(user).await
    }

    async fn dequeue(&self, local_id: &str) -> Result<bool, StoreError> {
        self.db.outbox().remove(local_id).await
    }

    async fn clear_queue(&self, user: &str) -> Result<u64, StoreError> {
        self.db.outbox().clear(user).await
    }

    async fn save_space(&self, user: &str, space: &Space) -> Result<(), StoreError> {
        self.db.spaces().save(user, space).await
    }

    async fn delete_space(&self, user: &str, space_id: &str) -> Result<bool, StoreError> {
        self.db.spaces().delete(user, space_id).await
    }

    async fn space(&self, user: &str, space_id: &str) -> Result<Option<Space>, StoreError> {
        self.db.spaces().find(user, space_id).await
    }

    async fn spaces_for(&self, user: &str) -> Result<Vec<Space>, StoreError> {
        self.db.spaces().for_user(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::{object, space};

    #[tokio::test]
    async fn memory_databases_are_isolated() {
        let a = SqliteStore::open(":memory:").await.unwrap();
        let b = SqliteStore::open(":memory:").await.unwrap();
        let item = CachedItem::new("i1", "spaces#a", object("o1"));
        assert!(a.insert_item(&item).await.unwrap());
        assert!(!b.contains_item("i1").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        let path = path.to_string_lossy().to_string();
        let user = "alice@example.org";
        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.save_space(user, &space("a", user)).await.unwrap();
            store
                .insert_item(&CachedItem::new("i1", "spaces#a", object("o1")))
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.spaces_for(user).await.unwrap(), vec![space("a", user)]);
        assert_eq!(store.items_by_node("spaces#a").await.unwrap().len(), 1);
    }
}
