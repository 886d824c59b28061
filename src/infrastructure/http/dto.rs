//! Data Transfer Objects

use serde::{Deserialize, Serialize};

use crate::application::{
    DispatchRecord, EntityRecord, PresentedStatus, SendMessageResponse, TurnOutcome,
};
use crate::domain::story::{EntityId, EntityKind};

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

/// 空数据响应
#[derive(Debug, Serialize)]
pub struct Empty {}

impl ApiResponse<Empty> {
    /// 成功但无数据
    pub fn ok() -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(Empty {}),
        }
    }
}

// ============================================================================
// Entity DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListEntitiesRequest {
    pub kind: EntityKind,
    #[serde(default)]
    pub story_id: Option<EntityId>,
}

#[derive(Debug, Serialize)]
pub struct EntityListResponse {
    pub kind: EntityKind,
    pub total: usize,
    pub items: Vec<EntityRecord>,
}

// ============================================================================
// Turn DTOs
// ============================================================================

/// 一个回合的结果
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub turn_id: String,
    /// completed / stream_failed / cancelled
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub display_text: String,
    pub status: PresentedStatus,
    pub records: Vec<DispatchRecord>,
    pub active_story: Option<EntityId>,
}

impl From<SendMessageResponse> for TurnResponse {
    fn from(response: SendMessageResponse) -> Self {
        let report = response.report;
        let reason = match &report.outcome {
            TurnOutcome::StreamFailed(reason) => Some(reason.clone()),
            _ => None,
        };
        Self {
            session_id: response.session_id,
            turn_id: report.turn_id,
            outcome: report.outcome.as_str(),
            reason,
            display_text: report.presentation.display_text,
            status: report.presentation.status,
            records: report.records,
            active_story: response.active_story,
        }
    }
}
