//! Space snapshots.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use spacelink_proto::{DataModel, Persistence, Role, Space, SpaceChannel, SpaceType};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::store::StoreError;

/// Repository for per-user space snapshots.
pub struct SpaceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SpaceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a snapshot, including channels, members and models.
    pub async fn save(&self, user: &str, space: &Space) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        delete_rows(&mut tx, user, &space.id).await?;

        sqlx::query(
            r#"
            INSERT INTO spaces (space_id, owner, name, domain, space_type, persistence, saved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&space.id)
        .bind(user)
        .bind(&space.name)
        .bind(&space.domain)
        .bind(space.space_type.as_str())
        .bind(space.persistence.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        for (position, channel) in space.channels.iter().enumerate() {
            let position = position as i64;
            sqlx::query(
                "INSERT INTO space_channels (space_id, owner, position, kind) VALUES (?, ?, ?, ?)",
            )
            .bind(&space.id)
            .bind(user)
            .bind(position)
            .bind(&channel.kind)
            .execute(&mut *tx)
            .await?;

            for (key, value) in &channel.properties {
                sqlx::query(
                    r#"
                    INSERT INTO space_channel_properties (space_id, owner, position, key, value)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&space.id)
                .bind(user)
                .bind(position)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (member, role) in &space.members {
            sqlx::query(
                "INSERT INTO space_members (space_id, owner, member, role) VALUES (?, ?, ?, ?)",
            )
            .bind(&space.id)
            .bind(user)
            .bind(member)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
        }

        for model in &space.data_models {
            sqlx::query(
                r#"
                INSERT INTO space_models (space_id, owner, namespace, schema_location)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&space.id)
            .bind(user)
            .bind(&model.namespace)
            .bind(&model.schema_location)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, user: &str, space_id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = delete_rows(&mut tx, user, space_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn find(&self, user: &str, space_id: &str) -> Result<Option<Space>, StoreError> {
        let row = sqlx::query_as::<_, SpaceRow>(
            r#"
            SELECT space_id, name, domain, space_type, persistence
            FROM spaces
            WHERE owner = ? AND space_id = ?
            "#,
        )
        .bind(user)
        .bind(space_id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(user, row).await?)),
            None => Ok(None),
        }
    }

    pub async fn for_user(&self, user: &str) -> Result<Vec<Space>, StoreError> {
        let rows = sqlx::query_as::<_, SpaceRow>(
            r#"
            SELECT space_id, name, domain, space_type, persistence
            FROM spaces
            WHERE owner = ?
            ORDER BY space_id
            "#,
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        let mut spaces = Vec::with_capacity(rows.len());
        for row in rows {
            spaces.push(self.hydrate(user, row).await?);
        }
        Ok(spaces)
    }

    async fn hydrate(&self, user: &str, row: SpaceRow) -> Result<Space, StoreError> {
        let (space_id, name, domain, space_type, persistence) = row;
        let space_type: SpaceType = space_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("space {}: {}", space_id, e)))?;

        let channel_rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT position, kind FROM space_channels WHERE space_id = ? AND owner = ? ORDER BY position",
        )
        .bind(&space_id)
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        let property_rows = sqlx::query_as::<_, (i64, String, String)>(
            r#"
            SELECT position, key, value
            FROM space_channel_properties
            WHERE space_id = ? AND owner = ?
            "#,
        )
        .bind(&space_id)
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        let channels = channel_rows
            .into_iter()
            .map(|(position, kind)| {
                let mut channel = SpaceChannel::new(kind);
                for (_, key, value) in property_rows.iter().filter(|(p, _, _)| *p == position) {
                    channel.properties.insert(key.clone(), value.clone());
                }
                channel
            })
            .collect();

        let member_rows = sqlx::query_as::<_, (String, String)>(
            "SELECT member, role FROM space_members WHERE space_id = ? AND owner = ?",
        )
        .bind(&space_id)
        .bind(user)
        .fetch_all(self.pool)
        .await?;
        let mut members = BTreeMap::new();
        for (member, role) in member_rows {
            let role: Role = role
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("space {}: {}", space_id, e)))?;
            members.insert(member, role);
        }

        let data_models: BTreeSet<DataModel> = sqlx::query_as::<_, (String, String)>(
            "SELECT namespace, schema_location FROM space_models WHERE space_id = ? AND owner = ?",
        )
        .bind(&space_id)
        .bind(user)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(|(namespace, schema_location)| DataModel::new(namespace, schema_location))
        .collect();

        Ok(Space {
            id: space_id,
            name,
            domain,
            space_type,
            channels,
            members,
            persistence: Persistence::parse(&persistence),
            data_models,
        })
    }
}

type SpaceRow = (String, String, String, String, String);

/// Remove a snapshot and its child rows. Children go first so this does not
/// depend on foreign key enforcement.
async fn delete_rows(
    tx: &mut Transaction<'_, Sqlite>,
    user: &str,
    space_id: &str,
) -> Result<bool, StoreError> {
    for table in [
        "space_channel_properties",
        "space_channels",
        "space_members",
        "space_models",
    ] {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE space_id = ? AND owner = ?",
            table
        ))
        .bind(space_id)
        .bind(user)
        .execute(&mut **tx)
        .await?;
    }
    let result = sqlx::query("DELETE FROM spaces WHERE space_id = ? AND owner = ?")
        .bind(space_id)
        .bind(user)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use spacelink_proto::{DataModel, Persistence, SpaceChannel};

    use crate::store::Database;
    use crate::store::fixtures::space;

    #[tokio::test]
    async fn snapshot_round_trips_with_children() {
        let db = Database::new(":memory:").await.unwrap();
        let repo = db.spaces();
        let user = "alice@example.org";
        let mut original = space("team1", user);
        original.persistence = Persistence::parse("P1DT2H");
        original
            .channels
            .push(SpaceChannel::new(SpaceChannel::MUC).with_property("address", "team1@muc.example.org"));
        original
            .data_models
            .insert(DataModel::new("urn:example:sensor", "https://example.org/sensor.xsd"));

        repo.save(user, &original).await.unwrap();
        let loaded = repo.find(user, "team1").await.unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(repo.find("bob@example.org", "team1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let db = Database::new(":memory:").await.unwrap();
        let repo = db.spaces();
        let user = "alice@example.org";
        let mut s = space("a", user);
        repo.save(user, &s).await.unwrap();
        s.members.remove("bob@example.org");
        s.name = "renamed".into();
        repo.save(user, &s).await.unwrap();

        let all = repo.for_user(user).await.unwrap();
        assert_eq!(all, vec![s]);
        assert!(repo.delete(user, "a").await.unwrap());
        assert!(!repo.delete(user, "a").await.unwrap());
    }
}
