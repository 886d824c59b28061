//! SQLite Entity Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{FromRow, Sqlite, Transaction};

use super::DbPool;
use crate::application::ports::{EntityRecord, EntityRepositoryPort, NewEntity, RepositoryError};
use crate::domain::story::{EntityId, EntityKind};

const SELECT_COLUMNS: &str =
    "SELECT id, kind, story_id, parent_id, attributes, created_at, updated_at FROM entities";

fn db_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(e.to_string())
}

/// SQLite Entity Repository
pub struct SqliteEntityRepository {
    pool: DbPool,
}

impl SqliteEntityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_in(
        tx: &mut Transaction<'_, Sqlite>,
        entity: NewEntity,
    ) -> Result<EntityRecord, RepositoryError> {
        let now = Utc::now();
        let attributes = serde_json::to_string(&entity.attributes)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO entities (kind, story_id, parent_id, attributes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity.kind.as_str())
        .bind(entity.story_id.map(|id| id.value()))
        .bind(entity.parent_id.map(|id| id.value()))
        .bind(attributes)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;

        Ok(EntityRecord {
            id: EntityId::new(result.last_insert_rowid()),
            kind: entity.kind,
            story_id: entity.story_id,
            parent_id: entity.parent_id,
            attributes: entity.attributes,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(FromRow)]
struct EntityRow {
    id: i64,
    kind: String,
    story_id: Option<i64>,
    parent_id: Option<i64>,
    attributes: String,
    created_at: String,
    updated_at: String,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

impl TryFrom<EntityRow> for EntityRecord {
    type Error = RepositoryError;

    fn try_from(row: EntityRow) -> Result<Self, Self::Error> {
        let kind = EntityKind::from_str(&row.kind).ok_or_else(|| {
            RepositoryError::SerializationError(format!("Unknown entity kind: {}", row.kind))
        })?;
        let attributes: Map<String, Value> = serde_json::from_str(&row.attributes)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        Ok(EntityRecord {
            id: EntityId::new(row.id),
            kind,
            story_id: row.story_id.map(EntityId::new),
            parent_id: row.parent_id.map(EntityId::new),
            attributes,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl EntityRepositoryPort for SqliteEntityRepository {
    async fn insert(&self, entity: NewEntity) -> Result<EntityRecord, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let record = Self::insert_in(&mut tx, entity).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(record)
    }

    async fn insert_batch(
        &self,
        entities: Vec<NewEntity>,
    ) -> Result<Vec<EntityRecord>, RepositoryError> {
        // 一批对白要么全部写入，要么全部不写
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut records = Vec::with_capacity(entities.len());
        for entity in entities {
            records.push(Self::insert_in(&mut tx, entity).await?);
        }
        tx.commit().await.map_err(db_error)?;
        Ok(records)
    }

    async fn find(
        &self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<Option<EntityRecord>, RepositoryError> {
        let row: Option<EntityRow> =
            sqlx::query_as(&format!("{} WHERE id = ? AND kind = ?", SELECT_COLUMNS))
                .bind(id.value())
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(EntityRecord::try_from).transpose()
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: EntityId,
        patch: Map<String, Value>,
    ) -> Result<EntityRecord, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row: Option<EntityRow> =
            sqlx::query_as(&format!("{} WHERE id = ? AND kind = ?", SELECT_COLUMNS))
                .bind(id.value())
                .bind(kind.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;
        let mut record = row
            .map(EntityRecord::try_from)
            .transpose()?
            .ok_or_else(|| RepositoryError::NotFound(format!("{} {}", kind, id)))?;

        for (key, value) in patch {
            record.attributes.insert(key, value);
        }
        record.updated_at = Utc::now();
        let attributes = serde_json::to_string(&record.attributes)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        sqlx::query("UPDATE entities SET attributes = ?, updated_at = ? WHERE id = ?")
            .bind(attributes)
            .bind(record.updated_at.to_rfc3339())
            .bind(id.value())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(record)
    }

    async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<(), RepositoryError> {
        // 使用事务确保原子性
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let deleted = sqlx::query("DELETE FROM entities WHERE id = ? AND kind = ?")
            .bind(id.value())
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        if deleted == 0 {
            return Err(RepositoryError::NotFound(format!("{} {}", kind, id)));
        }

        match kind {
            // 删除故事时移除其下所有实体
            EntityKind::Story => {
                sqlx::query("DELETE FROM entities WHERE story_id = ?")
                    .bind(id.value())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
            }
            // 删除章节时移除其对白
            EntityKind::Chapter => {
                sqlx::query("DELETE FROM entities WHERE kind = ? AND parent_id = ?")
                    .bind(EntityKind::Dialogue.as_str())
                    .bind(id.value())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
            }
            _ => {}
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn list(
        &self,
        kind: EntityKind,
        story_id: Option<EntityId>,
    ) -> Result<Vec<EntityRecord>, RepositoryError> {
        let rows: Vec<EntityRow> = match story_id {
            Some(story_id) => sqlx::query_as(&format!(
                "{} WHERE kind = ? AND story_id = ? ORDER BY id",
                SELECT_COLUMNS
            ))
            .bind(kind.as_str())
            .bind(story_id.value())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?,
            None => sqlx::query_as(&format!("{} WHERE kind = ? ORDER BY id", SELECT_COLUMNS))
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?,
        };

        rows.into_iter().map(EntityRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::sqlite::{create_pool, run_migrations, DatabaseConfig};
    use serde_json::json;

    async fn repo() -> SqliteEntityRepository {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteEntityRepository::new(pool)
    }

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = repo().await;
        let story = repo
            .insert(NewEntity::new(
                EntityKind::Story,
                attrs(json!({"title": "Rừng đêm", "tags": ["kinh dị"]})),
            ))
            .await
            .unwrap();

        let found = repo
            .find(EntityKind::Story, story.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.attr_str("title"), Some("Rừng đêm"));
        assert_eq!(found.attributes["tags"], json!(["kinh dị"]));
        assert!(found.story_id.is_none());

        assert!(repo
            .find(EntityKind::Character, story.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_merges_attributes() {
        let repo = repo().await;
        let story = repo
            .insert(NewEntity::new(
                EntityKind::Story,
                attrs(json!({"title": "A", "status": "draft"})),
            ))
            .await
            .unwrap();

        let updated = repo
            .update(
                EntityKind::Story,
                story.id,
                attrs(json!({"status": "published"})),
            )
            .await
            .unwrap();
        assert_eq!(updated.attr_str("title"), Some("A"));
        assert_eq!(updated.attr_str("status"), Some("published"));

        let missing = repo
            .update(EntityKind::Story, EntityId::new(999), Map::new())
            .await;
        assert!(matches!(missing, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_batch_and_list_order() {
        let repo = repo().await;
        let story = repo
            .insert(NewEntity::new(EntityKind::Story, Map::new()))
            .await
            .unwrap();
        let chapter = repo
            .insert(NewEntity::new(EntityKind::Chapter, Map::new()).in_story(story.id))
            .await
            .unwrap();

        let batch = repo
            .insert_batch(
                (1..=3)
                    .map(|order| {
                        NewEntity::new(EntityKind::Dialogue, attrs(json!({ "order": order })))
                            .in_story(story.id)
                            .with_parent(Some(chapter.id))
                    })
                    .collect(),
            )
            .await
            .unwrap();
        assert_eq!(batch.len(), 3);

        let listed = repo
            .list(EntityKind::Dialogue, Some(story.id))
            .await
            .unwrap();
        let orders: Vec<i64> = listed
            .iter()
            .map(|r| r.attributes["order"].as_i64().unwrap())
            .collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(listed[0].parent_id, Some(chapter.id));
        assert!(repo
            .list(EntityKind::Dialogue, Some(EntityId::new(12345)))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let repo = repo().await;
        let story = repo
            .insert(NewEntity::new(EntityKind::Story, Map::new()))
            .await
            .unwrap();
        let chapter = repo
            .insert(NewEntity::new(EntityKind::Chapter, Map::new()).in_story(story.id))
            .await
            .unwrap();
        repo.insert(
            NewEntity::new(EntityKind::Dialogue, Map::new())
                .in_story(story.id)
                .with_parent(Some(chapter.id)),
        )
        .await
        .unwrap();
        repo.insert(NewEntity::new(EntityKind::Character, Map::new()).in_story(story.id))
            .await
            .unwrap();

        repo.delete(EntityKind::Chapter, chapter.id).await.unwrap();
        assert!(repo
            .list(EntityKind::Dialogue, None)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.list(EntityKind::Character, None).await.unwrap().len(),
            1
        );

        repo.delete(EntityKind::Story, story.id).await.unwrap();
        assert!(repo
            .list(EntityKind::Character, None)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            repo.delete(EntityKind::Story, story.id).await,
            Err(RepositoryError::NotFound(_))
        ));
    }
}
