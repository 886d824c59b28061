//! Command Handler Port - 命令副作用处理器
//!
//! 每种命令对应一个异步处理器，执行实际的实体变更（外部 CRUD 层）。
//! 处理器由嵌入方按回合注册，可以读取回合上下文（如当前选中的故事）。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::RepositoryError;
use crate::application::dispatch::TurnContext;
use crate::domain::command::{CommandKind, CommandParams};
use crate::domain::story::EntityId;

/// 处理器错误
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// 处理成功后对回合上下文的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// 无上下文变化
    Done,
    /// 选中故事（例如刚创建的故事）
    SelectStory(EntityId),
    /// 故事已删除，若它是当前选中的故事则取消选中
    StoryRemoved(EntityId),
}

/// Command Handler Port
#[async_trait]
pub trait CommandHandlerPort: Send + Sync {
    async fn handle(
        &self,
        params: &CommandParams,
        context: &TurnContext,
    ) -> Result<HandlerOutcome, HandlerError>;
}

/// 处理器注册表：每种命令至多一个处理器
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandlerPort>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同种类已有的处理器会被替换
    pub fn register(&mut self, kind: CommandKind, handler: Arc<dyn CommandHandlerPort>) {
        self.handlers.insert(kind, handler);
    }

    /// 同一处理器注册到多个种类
    pub fn register_all(&mut self, kinds: &[CommandKind], handler: Arc<dyn CommandHandlerPort>) {
        for kind in kinds {
            self.register(*kind, handler.clone());
        }
    }

    pub fn get(&self, kind: CommandKind) -> Option<Arc<dyn CommandHandlerPort>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: CommandKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("HandlerRegistry").field("kinds", &kinds).finish()
    }
}
