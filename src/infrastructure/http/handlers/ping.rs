//! Ping Handler - 服务状态
//!
//! 模型服务不可达时状态为 `degraded`，已建立的会话仍可读取。

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::infrastructure::http::state::AppState;

#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub llm_reachable: bool,
    pub open_sessions: usize,
}

pub async fn ping(State(state): State<Arc<AppState>>) -> Json<PingResponse> {
    let llm_reachable = state.token_source.health_check().await;
    if !llm_reachable {
        tracing::warn!("Ping: token source health check failed");
    }

    Json(PingResponse {
        status: if llm_reachable { "ok" } else { "degraded" },
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        llm_reachable,
        open_sessions: state.sessions.list_all().len(),
    })
}
