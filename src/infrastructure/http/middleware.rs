//! HTTP Middleware
//!
//! 请求日志：按路由记录失败的请求。业务错误（HTTP 200 + errno != 0）通过
//! 响应扩展里的 [`ApiFailure`] 识别，与 4xx/5xx 一样带上路由、会话和耗时。

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use super::error::ApiFailure;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Quiet,
    Warn,
    Error,
}

/// 按 HTTP 状态和业务错误码决定日志级别
pub fn classify(status: StatusCode, failure: Option<&ApiFailure>) -> Severity {
    if status.is_server_error() {
        return Severity::Error;
    }
    if status.is_client_error() {
        return Severity::Warn;
    }
    match failure {
        Some(f) if f.errno >= 500 => Severity::Error,
        Some(_) => Severity::Warn,
        None => Severity::Quiet,
    }
}

/// WebSocket 路由的会话 id（`/ws/chat/{session_id}`）
fn path_session_id(path: &str) -> Option<&str> {
    path.strip_prefix("/ws/chat/").filter(|id| !id.is_empty())
}

/// 请求日志中间件
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let response = next.run(request).await;
    let status = response.status();
    let failure = response.extensions().get::<ApiFailure>();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let session_id = path_session_id(&path).unwrap_or("-");
    let errno = failure.map(|f| f.errno).unwrap_or(0);
    let error = failure.map(|f| f.message.as_str()).unwrap_or("");

    match classify(status, failure) {
        Severity::Error => tracing::error!(
            method = %method,
            route = %route,
            session_id = %session_id,
            status = status.as_u16(),
            errno = errno,
            error = %error,
            elapsed_ms = elapsed_ms,
            "Request failed"
        ),
        Severity::Warn => tracing::warn!(
            method = %method,
            route = %route,
            session_id = %session_id,
            status = status.as_u16(),
            errno = errno,
            error = %error,
            elapsed_ms = elapsed_ms,
            "Request rejected"
        ),
        Severity::Quiet => {}
    }

    response
}
