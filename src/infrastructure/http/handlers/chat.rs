//! Chat Handlers - 对话会话与回合

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::{
    CancelTurn, ChatMessage, CloseChatSession, CreateChatSession, GetChatSession, SelectStory,
    SendMessage,
};
use crate::domain::story::EntityId;
use crate::infrastructure::http::dto::{ApiResponse, Empty, TurnResponse};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionIdRequest {
    pub session_id: String,
}

// ============================================================================
// Create Session
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub story_id: Option<EntityId>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponseDto {
    pub session_id: String,
    pub active_story: Option<EntityId>,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<ApiResponse<CreateSessionResponseDto>>, ApiError> {
    let cmd = CreateChatSession {
        active_story: req.story_id,
    };

    let result = state.create_session_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::success(CreateSessionResponseDto {
        session_id: result.session_id,
        active_story: result.active_story,
    })))
}

// ============================================================================
// Select Story
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SelectStoryRequest {
    pub session_id: String,
    /// 省略或 null 表示取消选中
    #[serde(default)]
    pub story_id: Option<EntityId>,
}

pub async fn select_story(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectStoryRequest>,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    let cmd = SelectStory {
        session_id: req.session_id,
        story_id: req.story_id,
    };

    state.select_story_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::ok()))
}

// ============================================================================
// Get Session
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatSessionDto {
    pub session_id: String,
    pub active_story: Option<EntityId>,
    pub history: Vec<ChatMessage>,
    pub busy: bool,
    pub created_at: String,
    pub last_activity: String,
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionIdRequest>,
) -> Result<Json<ApiResponse<ChatSessionDto>>, ApiError> {
    let query = GetChatSession {
        session_id: req.session_id,
    };

    let result = state.get_session_handler.handle(query)?;

    Ok(Json(ApiResponse::success(ChatSessionDto {
        session_id: result.session_id,
        active_story: result.active_story,
        history: result.history,
        busy: result.busy,
        created_at: result.created_at,
        last_activity: result.last_activity,
    })))
}

// ============================================================================
// Close Session
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CloseSessionResponseDto {
    pub session_id: String,
}

pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionIdRequest>,
) -> Result<Json<ApiResponse<CloseSessionResponseDto>>, ApiError> {
    let cmd = CloseChatSession {
        session_id: req.session_id,
    };

    let result = state.close_session_handler.handle(cmd)?;

    Ok(Json(ApiResponse::success(CloseSessionResponseDto {
        session_id: result.session_id,
    })))
}

// ============================================================================
// Send Message
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub session_id: String,
    pub message: String,
}

/// 运行一个回合直到结束，返回展示文本和分发记录
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<TurnResponse>>, ApiError> {
    let cmd = SendMessage {
        session_id: req.session_id,
        message: req.message,
    };

    let result = state.send_message_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::success(TurnResponse::from(result))))
}

// ============================================================================
// Cancel Turn
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CancelTurnResponseDto {
    pub session_id: String,
    pub cancelled: bool,
}

pub async fn cancel_turn(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionIdRequest>,
) -> Result<Json<ApiResponse<CancelTurnResponseDto>>, ApiError> {
    let cmd = CancelTurn {
        session_id: req.session_id,
    };

    let result = state.cancel_turn_handler.handle(cmd)?;

    Ok(Json(ApiResponse::success(CancelTurnResponseDto {
        session_id: result.session_id,
        cancelled: result.cancelled,
    })))
}
