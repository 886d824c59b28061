//! In-Memory Entity Repository Implementation
//!
//! 用于测试和 `storage.backend = "memory"`，重启后数据丢失

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::application::ports::{EntityRecord, EntityRepositoryPort, NewEntity, RepositoryError};
use crate::domain::story::{EntityId, EntityKind};

/// 内存实体仓储（id 在所有种类间唯一递增）
pub struct InMemoryEntityRepository {
    entities: DashMap<i64, EntityRecord>,
    next_id: AtomicI64,
}

impl InMemoryEntityRepository {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn materialize(&self, entity: NewEntity) -> EntityRecord {
        let now = Utc::now();
        EntityRecord {
            id: EntityId::new(self.next_id.fetch_add(1, Ordering::SeqCst)),
            kind: entity.kind,
            story_id: entity.story_id,
            parent_id: entity.parent_id,
            attributes: entity.attributes,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for InMemoryEntityRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityRepositoryPort for InMemoryEntityRepository {
    async fn insert(&self, entity: NewEntity) -> Result<EntityRecord, RepositoryError> {
        let record = self.materialize(entity);
        self.entities.insert(record.id.value(), record.clone());
        Ok(record)
    }

    async fn insert_batch(
        &self,
        entities: Vec<NewEntity>,
    ) -> Result<Vec<EntityRecord>, RepositoryError> {
        let records: Vec<EntityRecord> = entities
            .into_iter()
            .map(|e| self.materialize(e))
            .collect();
        for record in &records {
            self.entities.insert(record.id.value(), record.clone());
        }
        Ok(records)
    }

    async fn find(
        &self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<Option<EntityRecord>, RepositoryError> {
        Ok(self
            .entities
            .get(&id.value())
            .filter(|r| r.kind == kind)
            .map(|r| r.clone()))
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: EntityId,
        patch: Map<String, Value>,
    ) -> Result<EntityRecord, RepositoryError> {
        let mut record = self
            .entities
            .get_mut(&id.value())
            .filter(|r| r.kind == kind)
            .ok_or_else(|| RepositoryError::NotFound(format!("{} {}", kind, id)))?;
        for (key, value) in patch {
            record.attributes.insert(key, value);
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<(), RepositoryError> {
        let exists = self
            .entities
            .get(&id.value())
            .map(|r| r.kind == kind)
            .unwrap_or(false);
        if !exists {
            return Err(RepositoryError::NotFound(format!("{} {}", kind, id)));
        }

        self.entities.remove(&id.value());
        match kind {
            EntityKind::Story => self.entities.retain(|_, r| r.story_id != Some(id)),
            EntityKind::Chapter => self
                .entities
                .retain(|_, r| !(r.kind == EntityKind::Dialogue && r.parent_id == Some(id))),
            _ => {}
        }
        Ok(())
    }

    async fn list(
        &self,
        kind: EntityKind,
        story_id: Option<EntityId>,
    ) -> Result<Vec<EntityRecord>, RepositoryError> {
        let mut records: Vec<EntityRecord> = self
            .entities
            .iter()
            .filter(|r| r.kind == kind && (story_id.is_none() || r.story_id == story_id))
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}
