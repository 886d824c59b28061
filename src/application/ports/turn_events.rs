//! Turn Event Port - 回合事件推送
//!
//! 分发协调器通过此端口发出强类型事件，订阅方（WebSocket 等）直接接收

use serde::{Deserialize, Serialize};

use crate::application::dispatch::PresentedStatus;
use crate::domain::command::CommandKind;

/// 回合事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum TurnEvent {
    /// 回合开始
    TurnStarted { session_id: String, turn_id: String },
    /// 展示文本或状态变化
    Presentation {
        session_id: String,
        display_text: String,
        status: PresentedStatus,
    },
    /// 命令开始分发
    CommandStarted {
        session_id: String,
        key: String,
        kind: CommandKind,
    },
    /// 命令执行成功
    CommandSucceeded {
        session_id: String,
        key: String,
        kind: CommandKind,
    },
    /// 命令失败（解码、前置条件、处理器、截断）
    CommandFailed {
        session_id: String,
        key: String,
        kind: CommandKind,
        reason: String,
    },
    /// 回合结束
    TurnFinished { session_id: String, outcome: String },
    /// 会话关闭
    SessionClosed { session_id: String, reason: String },
}

impl TurnEvent {
    pub fn session_id(&self) -> &str {
        match self {
            TurnEvent::TurnStarted { session_id, .. }
            | TurnEvent::Presentation { session_id, .. }
            | TurnEvent::CommandStarted { session_id, .. }
            | TurnEvent::CommandSucceeded { session_id, .. }
            | TurnEvent::CommandFailed { session_id, .. }
            | TurnEvent::TurnFinished { session_id, .. }
            | TurnEvent::SessionClosed { session_id, .. } => session_id,
        }
    }
}

/// Turn Event Sink Port
pub trait TurnEventSink: Send + Sync {
    fn publish(&self, event: TurnEvent);
}
