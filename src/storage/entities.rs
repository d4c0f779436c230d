use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{Entity, EntityKind, StoreError};

impl Database {
    // ========================================================================
    // Entity State Operations
    // ========================================================================

    /// Load the cached state of an entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when nothing has been stored for this
    /// `(entity_id, kind)` yet; callers start from [`Entity::new`] in that case.
    pub async fn load_entity(&self, entity_id: &str, kind: EntityKind) -> Result<Entity, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT state FROM entities WHERE entity_id = ? AND kind = ?")
                .bind(entity_id)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let (state,) = row.ok_or_else(|| StoreError::NotFound {
            id: entity_id.to_string(),
            kind,
        })?;

        Ok(serde_json::from_str(&state)?)
    }

    /// Persist an entity's state.
    ///
    /// A single upsert replaces the whole serialized entity, so concurrent
    /// readers see either the previous or the new state of every section.
    pub async fn save_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        let state = serde_json::to_string(entity)?;
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO entities (entity_id, kind, state, saved_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(entity_id, kind) DO UPDATE SET
                state = excluded.state,
                saved_at = excluded.saved_at
        "#,
        )
        .bind(&entity.id)
        .bind(entity.kind.as_str())
        .bind(&state)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove an entity's state. Returns `true` if a row was deleted.
    pub async fn delete_entity(&self, entity_id: &str, kind: EntityKind) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM entities WHERE entity_id = ? AND kind = ?")
            .bind(entity_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every entity not saved since `cutoff`.
    ///
    /// Returns the number of entities evicted.
    pub async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM entities WHERE saved_at < ?")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Conditional, Database, Entity, EntityKind, SectionUpdate, StoreError};
    use chrono::{TimeDelta, Utc};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let db = test_db().await;
        let err = db.load_entity("C1", EntityKind::Channel).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let db = test_db().await;
        let entity = Entity::new("C1", EntityKind::Channel).apply_fetch_result(
            SectionUpdate::Feed(Conditional::Modified {
                payload: Default::default(),
                token: "etag-1".to_string(),
            }),
            Utc::now(),
        );

        db.save_entity(&entity).await.unwrap();
        let loaded = db.load_entity("C1", EntityKind::Channel).await.unwrap();
        assert_eq!(loaded, entity);
    }

    #[tokio::test]
    async fn test_same_id_different_kind_is_isolated() {
        let db = test_db().await;
        db.save_entity(&Entity::new("X1", EntityKind::Channel))
            .await
            .unwrap();

        assert!(db.load_entity("X1", EntityKind::Channel).await.is_ok());
        assert!(matches!(
            db.load_entity("X1", EntityKind::Playlist).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let db = test_db().await;
        let first = Entity::new("C1", EntityKind::Channel);
        db.save_entity(&first).await.unwrap();

        let second = first.apply_fetch_result(
            SectionUpdate::Feed(Conditional::Modified {
                payload: Default::default(),
                token: "etag-2".to_string(),
            }),
            Utc::now(),
        );
        db.save_entity(&second).await.unwrap();

        let loaded = db.load_entity("C1", EntityKind::Channel).await.unwrap();
        assert_eq!(loaded.feed.freshness_token.as_deref(), Some("etag-2"));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_delete_entity() {
        let db = test_db().await;
        db.save_entity(&Entity::new("C1", EntityKind::Channel))
            .await
            .unwrap();

        assert!(db.delete_entity("C1", EntityKind::Channel).await.unwrap());
        assert!(!db.delete_entity("C1", EntityKind::Channel).await.unwrap());
    }

    #[tokio::test]
    async fn test_evict_older_than() {
        let db = test_db().await;
        db.save_entity(&Entity::new("C1", EntityKind::Channel))
            .await
            .unwrap();

        // Backdate one row directly
        sqlx::query(
            "INSERT INTO entities (entity_id, kind, state, saved_at) VALUES ('OLD', 'channel', '{}', ?)",
        )
        .bind((Utc::now() - TimeDelta::days(30)).timestamp())
        .execute(&db.pool)
        .await
        .unwrap();

        let evicted = db
            .evict_older_than(Utc::now() - TimeDelta::days(7))
            .await
            .unwrap();
        assert_eq!(evicted, 1);
        assert!(db.load_entity("C1", EntityKind::Channel).await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_reported() {
        let db = test_db().await;
        sqlx::query(
            "INSERT INTO entities (entity_id, kind, state, saved_at) VALUES ('C1', 'channel', 'not json', 0)",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        assert!(matches!(
            db.load_entity("C1", EntityKind::Channel).await,
            Err(StoreError::Serialization(_))
        ));
    }
}
