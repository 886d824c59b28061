//! HTTP Token Source - 调用 OpenAI 兼容的流式补全服务
//!
//! 实现 TokenSourcePort trait：
//! POST {base_url}/chat/completions
//! Request: {"model": "...", "messages": [...], "stream": true}  (JSON)
//! Response: text/event-stream，每行 `data: {...}`，以 `data: [DONE]` 结束

use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::io;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use crate::application::ports::{
    ChatMessage, CompletionRequest, TokenSourceError, TokenSourcePort, TokenStream,
};

/// 补全请求体 (JSON)
#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// HTTP Token Source 配置
#[derive(Debug, Clone)]
pub struct HttpTokenSourceConfig {
    /// 服务基础 URL（不含 /chat/completions）
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// 模型名称
    pub model: String,
    /// 请求超时时间（秒），覆盖整个流式响应
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for HttpTokenSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 300,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl HttpTokenSourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

/// 单行 SSE 的解析结果
#[derive(Debug, Clone, PartialEq)]
enum SseLine {
    /// 非空的文本增量
    Content(String),
    /// 服务端声明流结束
    Done,
    /// 服务端在流中返回的错误对象
    Error(String),
    /// 注释、空行、角色声明等无内容行
    Skip,
}

/// 解析一行 SSE
fn parse_sse_line(line: &str) -> SseLine {
    let trimmed = line.trim();
    if !trimmed.starts_with("data:") {
        return SseLine::Skip;
    }
    let chunk = trimmed.trim_start_matches("data:").trim();
    if chunk == "[DONE]" {
        return SseLine::Done;
    }

    let value: Value = match serde_json::from_str(chunk) {
        Ok(v) => v,
        Err(_) => return SseLine::Skip,
    };

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return SseLine::Error(message);
    }

    value
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(|c| SseLine::Content(c.to_string()))
        .unwrap_or(SseLine::Skip)
}

fn map_request_error(e: reqwest::Error) -> TokenSourceError {
    if e.is_timeout() {
        TokenSourceError::Timeout
    } else if e.is_connect() {
        TokenSourceError::NetworkError(format!("Cannot connect to model service: {}", e))
    } else {
        TokenSourceError::NetworkError(e.to_string())
    }
}

/// HTTP Token Source
pub struct HttpTokenSource {
    client: Client,
    config: HttpTokenSourceConfig,
}

impl HttpTokenSource {
    pub fn new(config: HttpTokenSourceConfig) -> Result<Self, TokenSourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TokenSourceError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TokenSourcePort for HttpTokenSource {
    async fn open(&self, request: CompletionRequest) -> Result<TokenStream, TokenSourceError> {
        let body = ChatCompletionBody {
            model: &self.config.model,
            messages: &request.messages,
            stream: true,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        tracing::debug!(
            url = %self.completions_url(),
            model = %self.config.model,
            messages = request.messages.len(),
            "Opening completion stream"
        );

        let mut builder = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TokenSourceError::ServiceError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let bytes = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let lines = StreamReader::new(bytes).lines();

        // 状态为 None 表示流已结束（收到 [DONE] 或出错）
        let fragments = stream::unfold(Some(lines), |state| async move {
            let mut lines = state?;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_sse_line(&line) {
                        SseLine::Content(text) => return Some((Ok(text), Some(lines))),
                        SseLine::Done => return None,
                        SseLine::Error(message) => {
                            return Some((Err(TokenSourceError::ServiceError(message)), None))
                        }
                        SseLine::Skip => continue,
                    },
                    Ok(None) => return None,
                    Err(e) => {
                        tracing::warn!(error = %e, "Completion stream read failed");
                        return Some((Err(TokenSourceError::NetworkError(e.to_string())), None));
                    }
                }
            }
        });

        Ok(fragments.boxed())
    }

    async fn health_check(&self) -> bool {
        let mut builder = self
            .client
            .get(self.models_url())
            .timeout(Duration::from_secs(5));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        match builder.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, routing::post, Router};

    #[test]
    fn test_config_default() {
        let config = HttpTokenSourceConfig::default();
        assert_eq!(config.timeout_secs, 300);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = HttpTokenSourceConfig::new("http://example.com/v1")
            .with_timeout(60)
            .with_model("story-model")
            .with_api_key(Some(String::new()));
        assert_eq!(config.base_url, "http://example.com/v1");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.model, "story-model");
        // 空 key 视为未配置
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"hel"}}]}"#),
            SseLine::Content("hel".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            SseLine::Skip
        );
        assert_eq!(
            parse_sse_line(r#"data: {"error":{"message":"overloaded"}}"#),
            SseLine::Error("overloaded".to_string())
        );
    }

    #[tokio::test]
    async fn test_stream_from_sse_endpoint() {
        const BODY: &str = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"Xin \"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"chào\"}}]}\n\n\
data: [DONE]\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n";

        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { ([(header::CONTENT_TYPE, "text/event-stream")], BODY) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source =
            HttpTokenSource::new(HttpTokenSourceConfig::new(format!("http://{}/v1/", addr)))
                .unwrap();
        let stream = source
            .open(CompletionRequest {
                messages: vec![ChatMessage::user("hi")],
            })
            .await
            .unwrap();
        let fragments: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(fragments, vec!["Xin ", "chào"]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_service_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source =
            HttpTokenSource::new(HttpTokenSourceConfig::new(format!("http://{}", addr))).unwrap();
        let result = source
            .open(CompletionRequest {
                messages: vec![ChatMessage::user("hi")],
            })
            .await;
        assert!(matches!(result, Err(TokenSourceError::ServiceError(m)) if m.contains("401")));
    }
}
