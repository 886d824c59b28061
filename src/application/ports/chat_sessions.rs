//! Chat Session Port - 对话会话生命周期管理
//!
//! 定义会话管理的抽象接口，具体实现在 infrastructure/memory 层

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::ChatMessage;
use crate::application::dispatch::TurnGate;
use crate::domain::story::EntityId;

/// Chat Session 错误
#[derive(Debug, Error)]
pub enum ChatSessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),
}

/// 对话会话状态（in-memory）
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: String,
    /// 当前选中的故事
    pub active_story: Option<EntityId>,
    /// 历史消息（user / assistant 交替），不含系统提示
    pub history: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// 同一会话同时只有一个回合在运行
    pub gate: Arc<TurnGate>,
}

impl ChatSession {
    pub fn new(active_story: Option<EntityId>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            active_story,
            history: Vec::new(),
            created_at: now,
            last_activity: now,
            gate: Arc::new(TurnGate::new()),
        }
    }
}

/// Chat Session Manager Port
///
/// 所有状态存储在内存中
pub trait ChatSessionManagerPort: Send + Sync {
    /// 创建新会话
    fn create(&self, session: ChatSession) -> Result<String, ChatSessionError>;

    /// 获取会话快照
    fn get(&self, id: &str) -> Result<ChatSession, ChatSessionError>;

    /// 设置当前选中的故事
    fn set_active_story(
        &self,
        id: &str,
        story_id: Option<EntityId>,
    ) -> Result<(), ChatSessionError>;

    /// 追加一轮对话，历史超过 `limit` 条时丢弃最早的消息
    fn append_exchange(
        &self,
        id: &str,
        user: ChatMessage,
        assistant: ChatMessage,
        limit: usize,
    ) -> Result<(), ChatSessionError>;

    /// 关闭会话，返回被移除的会话
    fn close(&self, id: &str) -> Result<ChatSession, ChatSessionError>;

    /// 更新最后活动时间
    fn touch(&self, id: &str);

    /// 获取所有过期会话的 ID
    fn get_expired_sessions(&self, idle_timeout_secs: u64) -> Vec<String>;

    /// 获取所有会话 ID
    fn list_all(&self) -> Vec<String>;
}
