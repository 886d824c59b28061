//! Chat Commands - 对话相关命令

use crate::application::dispatch::TurnReport;
use crate::domain::story::EntityId;

/// 创建对话会话
#[derive(Debug, Clone, Default)]
pub struct CreateChatSession {
    pub active_story: Option<EntityId>,
}

#[derive(Debug, Clone)]
pub struct CreateChatSessionResponse {
    pub session_id: String,
    pub active_story: Option<EntityId>,
}

/// 选中故事（None 表示取消选中）
#[derive(Debug, Clone)]
pub struct SelectStory {
    pub session_id: String,
    pub story_id: Option<EntityId>,
}

/// 发送用户消息，运行一个回合
#[derive(Debug, Clone)]
pub struct SendMessage {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct SendMessageResponse {
    pub session_id: String,
    pub report: TurnReport,
    /// 回合结束后会话选中的故事
    pub active_story: Option<EntityId>,
}

/// 取消正在运行的回合
#[derive(Debug, Clone)]
pub struct CancelTurn {
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct CancelTurnResponse {
    pub session_id: String,
    pub cancelled: bool,
}

/// 关闭对话会话
#[derive(Debug, Clone)]
pub struct CloseChatSession {
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct CloseChatSessionResponse {
    pub session_id: String,
}
