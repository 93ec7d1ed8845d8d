//! Cached pubsub items.

use sqlx::SqlitePool;

use super::{from_millis, to_millis};
use crate::store::{CachedItem, StoreError};

/// Repository for cached items.
pub struct ItemRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ItemRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert unless the id is present. Returns whether a row was written.
    pub async fn insert(&self, item: &CachedItem) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(&item.payload)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO cached_items (item_id, node, name, namespace, payload, cached_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.item_id)
        .bind(&item.node)
        .bind(&item.payload.name)
        .bind(&item.payload.namespace)
        .bind(&payload)
        .bind(to_millis(item.cached_at))
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn contains(&self, item_id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM cached_items WHERE item_id = ?")
                .bind(item_id)
                .fetch_optional(self.pool)
                .await?;
        Ok(found.is_some())
    }

    pub async fn by_node(&self, node: &str) -> Result<Vec<CachedItem>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, i64)>(
            r#"
            SELECT item_id, node, payload, cached_at
            FROM cached_items
            WHERE node = ?
            ORDER BY cached_at, rowid
            "#,
        )
        .bind(node)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(item_id, node, payload, cached_at)| {
                Ok(CachedItem {
                    item_id,
                    node,
                    payload: serde_json::from_str(&payload)?,
                    cached_at: from_millis(cached_at)?,
                })
            })
            .collect()
    }

    pub async fn delete_by_node(&self, node: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cached_items WHERE node = ?")
            .bind(node)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cached_items")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::store::fixtures::object;
    use crate::store::{CachedItem, Database};

    #[tokio::test]
    async fn duplicate_insert_is_ignored() {
        let db = Database::new(":memory:").await.unwrap();
        let items = db.items();
        let first = CachedItem::new("i1", "spaces#a", object("o1"));
        assert!(items.insert(&first).await.unwrap());
        let mut again = first.clone();
        again.payload = object("other");
        assert!(!items.insert(&again).await.unwrap());

        let stored = items.by_node("spaces#a").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payload.id(), Some("o1"));
    }

    #[tokio::test]
    async fn delete_by_node_leaves_others() {
        let db = Database::new(":memory:").await.unwrap();
        let items = db.items();
        items
            .insert(&CachedItem::new("i1", "spaces#a", object("o1")))
            .await
            .unwrap();
        items
            .insert(&CachedItem::new("i2", "spaces#b", object("o2")))
            .await
            .unwrap();
        assert_eq!(items.delete_by_node("spaces#a").await.unwrap(), 1);
        assert!(!items.contains("i1").await.unwrap());
        assert!(items.contains("i2").await.unwrap());
    }
}
