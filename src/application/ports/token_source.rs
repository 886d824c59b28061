//! Token Source Port - 生成式模型的流式输出
//!
//! 把外部模型视为黑盒的文本片段流，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token Source 错误
#[derive(Debug, Clone, Error)]
pub enum TokenSourceError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// 一个回合的文本片段流（UTF-8）
pub type TokenStream = BoxStream<'static, Result<String, TokenSourceError>>;

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 对话消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// 补全请求
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
}

/// Token Source Port
#[async_trait]
pub trait TokenSourcePort: Send + Sync {
    /// 开始一次流式补全，返回文本片段流
    async fn open(&self, request: CompletionRequest) -> Result<TokenStream, TokenSourceError>;

    /// 检查模型服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
