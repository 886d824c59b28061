//! Chat / Entity Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{
    ChatMessage, ChatSession, ChatSessionManagerPort, EntityRecord, EntityRepositoryPort,
};
use crate::application::queries::{GetChatSession, ListEntities};
use crate::domain::story::EntityId;

// ============================================================================
// Response DTOs
// ============================================================================

/// 对话会话详情响应
#[derive(Debug, Clone)]
pub struct ChatSessionResponse {
    pub session_id: String,
    pub active_story: Option<EntityId>,
    pub history: Vec<ChatMessage>,
    /// 是否有回合正在运行
    pub busy: bool,
    pub created_at: String,
    pub last_activity: String,
}

impl From<ChatSession> for ChatSessionResponse {
    fn from(session: ChatSession) -> Self {
        Self {
            busy: session.gate.is_busy(),
            session_id: session.id,
            active_story: session.active_story,
            history: session.history,
            created_at: session.created_at.to_rfc3339(),
            last_activity: session.last_activity.to_rfc3339(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GetChatSession Handler
pub struct GetChatSessionHandler {
    sessions: Arc<dyn ChatSessionManagerPort>,
}

impl GetChatSessionHandler {
    pub fn new(sessions: Arc<dyn ChatSessionManagerPort>) -> Self {
        Self { sessions }
    }

    pub fn handle(&self, query: GetChatSession) -> Result<ChatSessionResponse, ApplicationError> {
        let session = self.sessions.get(&query.session_id)?;
        Ok(ChatSessionResponse::from(session))
    }
}

/// ListEntities Handler
pub struct ListEntitiesHandler {
    repo: Arc<dyn EntityRepositoryPort>,
}

impl ListEntitiesHandler {
    pub fn new(repo: Arc<dyn EntityRepositoryPort>) -> Self {
        Self { repo }
    }

    pub async fn handle(&self, query: ListEntities) -> Result<Vec<EntityRecord>, ApplicationError> {
        Ok(self.repo.list(query.kind, query.story_id).await?)
    }
}
