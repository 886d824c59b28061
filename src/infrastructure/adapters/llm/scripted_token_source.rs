//! Scripted Token Source - 离线回放固定回复
//!
//! 不调用任何模型服务，按固定字符数把预设回复切成片段依次返回。
//! 用于测试和 `llm.mode = "scripted"` 的演示模式。

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::application::ports::{
    CompletionRequest, TokenSourceError, TokenSourcePort, TokenStream,
};

/// Scripted Token Source
#[derive(Debug, Clone)]
pub struct ScriptedTokenSource {
    reply: String,
    chunk_chars: usize,
    /// 返回这么多片段后以网络错误结束
    fail_after: Option<usize>,
}

impl ScriptedTokenSource {
    /// 创建回放源，`chunk_chars` 为 0 时整段回复作为一个片段
    pub fn new(reply: impl Into<String>, chunk_chars: usize) -> Self {
        Self {
            reply: reply.into(),
            chunk_chars,
            fail_after: None,
        }
    }

    /// 在第 `chunks` 个片段之后模拟流中断
    pub fn fail_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    /// 按字符（而非字节）切分，保证每个片段都是合法 UTF-8
    fn chunks(&self) -> Vec<String> {
        let chars: Vec<char> = self.reply.chars().collect();
        let size = if self.chunk_chars == 0 {
            chars.len().max(1)
        } else {
            self.chunk_chars
        };
        chars
            .chunks(size)
            .map(|chunk| chunk.iter().collect())
            .collect()
    }
}

#[async_trait]
impl TokenSourcePort for ScriptedTokenSource {
    async fn open(&self, request: CompletionRequest) -> Result<TokenStream, TokenSourceError> {
        let mut items: Vec<Result<String, TokenSourceError>> =
            self.chunks().into_iter().map(Ok).collect();

        if let Some(limit) = self.fail_after {
            items.truncate(limit);
            items.push(Err(TokenSourceError::NetworkError(
                "scripted stream interrupted".to_string(),
            )));
        }

        tracing::debug!(
            messages = request.messages.len(),
            fragments = items.len(),
            "Replaying scripted reply"
        );

        Ok(stream::iter(items).boxed())
    }
}
