//! Offline outbound queue.

use sqlx::SqlitePool;

use super::{from_millis, to_millis};
use crate::store::{QueuedOutbound, StoreError};

/// Repository for queued publishes.
pub struct OutboxRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OutboxRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn push(&self, entry: &QueuedOutbound) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&entry.payload)?;
        sqlx::query(
            r#"
            INSERT INTO outbound_queue (local_id, space_id, owner, payload, queued_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.local_id)
        .bind(&entry.space_id)
        .bind(&entry.user)
        .bind(&payload)
        .bind(to_millis(entry.queued_at))
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Entries of `user` in insertion order.
    pub async fn for_user(&self, user: &str) -> Result<Vec<QueuedOutbound>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, String, i64)>(
            r#"
            SELECT local_id, space_id, owner, payload, queued_at
            FROM outbound_queue
            WHERE owner = ?
            ORDER BY seq
            "#,
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(local_id, space_id, user, payload, queued_at)| {
                Ok(QueuedOutbound {
                    local_id,
                    space_id,
                    user,
                    payload: serde_json::from_str(&payload)?,
                    queued_at: from_millis(queued_at)?,
                })
            })
            .collect()
    }

    pub async fn remove(&self, local_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM outbound_queue WHERE local_id = ?")
            .bind(local_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self, user: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM outbound_queue WHERE owner = ?")
            .bind(user)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::store::fixtures::object;
    use crate::store::{Database, QueuedOutbound};

    fn entry(local_id: &str, user: &str) -> QueuedOutbound {
        QueuedOutbound {
            local_id: local_id.to_string(),
            space_id: "a".to_string(),
            user: user.to_string(),
            payload: object(local_id),
            queued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn entries_come_back_in_insertion_order() {
        let db = Database::new(":memory:").await.unwrap();
        let outbox = db.outbox();
        for id in ["z", "a", "m"] {
            outbox.push(&entry(id, "alice@example.org")).await.unwrap();
        }
        outbox.push(&entry("x", "bob@example.org")).await.unwrap();

        let ids: Vec<String> = outbox
            .for_user("alice@example.org")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.local_id)
            .collect();
        assert_eq!(ids, vec!["z", "a", "m"]);

        assert!(outbox.remove("a").await.unwrap());
        assert!(!outbox.remove("a").await.unwrap());
        assert_eq!(outbox.clear("alice@example.org").await.unwrap(), 2);
        assert_eq!(outbox.for_user("bob@example.org").await.unwrap().len(), 1);
    }
}
