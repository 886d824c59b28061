//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                      GET   健康检查
//! - /api/chat/session/create       POST  创建对话会话（可带初始故事）
//! - /api/chat/session/select_story POST  选中 / 取消选中故事
//! - /api/chat/session/get          POST  获取会话详情
//! - /api/chat/session/close        POST  关闭会话（取消正在运行的回合）
//! - /api/chat/send                 POST  发送消息，运行回合直到结束
//! - /api/chat/cancel               POST  取消正在运行的回合
//! - /api/entity/list               POST  列出命令产生的实体
//! - /ws/chat/{session_id}          WS    回合事件推送 + 发送消息

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws/chat/:session_id", get(handlers::chat_websocket_handler))
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/chat", chat_routes())
        .route("/entity/list", post(handlers::list_entities))
}

/// Chat 路由
fn chat_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session/create", post(handlers::create_session))
        .route("/session/select_story", post(handlers::select_story))
        .route("/session/get", post(handlers::get_session))
        .route("/session/close", post(handlers::close_session))
        .route("/send", post(handlers::send_message))
        .route("/cancel", post(handlers::cancel_turn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use crate::infrastructure::adapters::llm::ScriptedTokenSource;
    use crate::infrastructure::events::EventPublisher;
    use crate::infrastructure::memory::{InMemoryChatSessionManager, InMemoryEntityRepository};

    const REPLY: &str = "Đã tạo truyện cho bạn.\n\
/create-story {\"title\": \"Rừng đêm\", \"description\": \"Kinh dị\"}\n\
/create-character {\"name\": \"Lan\", \"description\": \"Cô gái trẻ\"}\n";

    fn app() -> Router {
        let state = AppState::new(
            Arc::new(InMemoryChatSessionManager::new()),
            Arc::new(InMemoryEntityRepository::new()),
            Arc::new(ScriptedTokenSource::new(REPLY, 7)),
            EventPublisher::new().arc(),
            20,
        );
        create_routes().with_state(Arc::new(state))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Value {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let app = app();
        call(&app, Method::POST, "/api/chat/session/create", Some(json!({}))).await;
        let json = call(&app, Method::GET, "/api/ping", None).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "storyloom");
        assert_eq!(json["llm_reachable"], true);
        assert_eq!(json["open_sessions"], 1);
    }

    #[tokio::test]
    async fn test_chat_turn_round_trip() {
        let app = app();

        let created = call(&app, Method::POST, "/api/chat/session/create", Some(json!({}))).await;
        assert_eq!(created["errno"], 0);
        let session_id = created["data"]["session_id"].as_str().unwrap().to_string();

        let turn = call(
            &app,
            Method::POST,
            "/api/chat/send",
            Some(json!({"session_id": session_id, "message": "Viết truyện kinh dị"})),
        )
        .await;
        assert_eq!(turn["errno"], 0);
        let data = &turn["data"];
        assert_eq!(data["outcome"], "completed");
        assert_eq!(data["display_text"], "Đã tạo truyện cho bạn.");
        assert_eq!(data["status"], "success");
        let records = data["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r["status"] == "success"));
        let story_id = data["active_story"].as_i64().unwrap();

        let characters = call(
            &app,
            Method::POST,
            "/api/entity/list",
            Some(json!({"kind": "character", "story_id": story_id})),
        )
        .await;
        assert_eq!(characters["data"]["total"], 1);
        assert_eq!(characters["data"]["items"][0]["attributes"]["name"], "Lan");

        let session = call(
            &app,
            Method::POST,
            "/api/chat/session/get",
            Some(json!({"session_id": session_id})),
        )
        .await;
        assert_eq!(session["data"]["active_story"], story_id);
        assert_eq!(session["data"]["history"].as_array().unwrap().len(), 2);
        assert_eq!(session["data"]["busy"], false);
    }

    #[tokio::test]
    async fn test_unknown_session_uses_error_envelope() {
        let app = app();
        let json = call(
            &app,
            Method::POST,
            "/api/chat/send",
            Some(json!({"session_id": "missing", "message": "hi"})),
        )
        .await;
        assert_eq!(json["errno"], 404);
        assert!(json["data"].is_null());
    }

    #[tokio::test]
    async fn test_select_unknown_story_rejected() {
        let app = app();
        let created = call(&app, Method::POST, "/api/chat/session/create", Some(json!({}))).await;
        let session_id = created["data"]["session_id"].as_str().unwrap().to_string();

        let json = call(
            &app,
            Method::POST,
            "/api/chat/session/select_story",
            Some(json!({"session_id": session_id, "story_id": 42})),
        )
        .await;
        assert_eq!(json["errno"], 404);

        let closed = call(
            &app,
            Method::POST,
            "/api/chat/session/close",
            Some(json!({"session_id": session_id})),
        )
        .await;
        assert_eq!(closed["errno"], 0);

        let cancelled = call(
            &app,
            Method::POST,
            "/api/chat/cancel",
            Some(json!({"session_id": session_id})),
        )
        .await;
        assert_eq!(cancelled["errno"], 404);
    }
}
