//! Repository Ports - 出站端口
//!
//! 命令处理器所需的实体持久化抽象。
//! 采用文档式存储：种类 + id + 所属故事 + 父实体 + JSON 属性，
//! 具体实现在 infrastructure 层（SQLite / 内存）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::story::{EntityId, EntityKind};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// 持久化的实体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    /// 所属故事（故事本身为 None）
    pub story_id: Option<EntityId>,
    /// 父实体（对白所属章节、大纲关联章节）
    pub parent_id: Option<EntityId>,
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    /// 读取字符串属性
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

/// 待插入的实体
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub kind: EntityKind,
    pub story_id: Option<EntityId>,
    pub parent_id: Option<EntityId>,
    pub attributes: Map<String, Value>,
}

impl NewEntity {
    pub fn new(kind: EntityKind, attributes: Map<String, Value>) -> Self {
        Self {
            kind,
            story_id: None,
            parent_id: None,
            attributes,
        }
    }

    pub fn in_story(mut self, story_id: EntityId) -> Self {
        self.story_id = Some(story_id);
        self
    }

    pub fn with_parent(mut self, parent_id: Option<EntityId>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// Entity Repository Port
#[async_trait]
pub trait EntityRepositoryPort: Send + Sync {
    /// 插入实体，返回分配了 id 的记录
    async fn insert(&self, entity: NewEntity) -> Result<EntityRecord, RepositoryError>;

    /// 批量插入（全部成功或全部失败）
    async fn insert_batch(
        &self,
        entities: Vec<NewEntity>,
    ) -> Result<Vec<EntityRecord>, RepositoryError>;

    /// 按 id 查找
    async fn find(
        &self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<Option<EntityRecord>, RepositoryError>;

    /// 合并更新属性，返回更新后的记录
    async fn update(
        &self,
        kind: EntityKind,
        id: EntityId,
        patch: Map<String, Value>,
    ) -> Result<EntityRecord, RepositoryError>;

    /// 删除实体（故事级联删除其下所有实体，章节级联删除其对白）
    async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<(), RepositoryError>;

    /// 列出某种实体，可按所属故事过滤
    async fn list(
        &self,
        kind: EntityKind,
        story_id: Option<EntityId>,
    ) -> Result<Vec<EntityRecord>, RepositoryError>;
}
