//! Chat / Entity Queries

use crate::domain::story::{EntityId, EntityKind};

/// 获取对话会话详情查询
#[derive(Debug, Clone)]
pub struct GetChatSession {
    pub session_id: String,
}

/// 列出实体查询（读回命令产生的结果）
#[derive(Debug, Clone)]
pub struct ListEntities {
    pub kind: EntityKind,
    pub story_id: Option<EntityId>,
}
