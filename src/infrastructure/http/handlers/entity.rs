//! Entity Handlers - 读回命令产生的实体

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::ListEntities;
use crate::infrastructure::http::dto::{ApiResponse, EntityListResponse, ListEntitiesRequest};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn list_entities(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ListEntitiesRequest>,
) -> Result<Json<ApiResponse<EntityListResponse>>, ApiError> {
    let query = ListEntities {
        kind: req.kind,
        story_id: req.story_id,
    };

    let items = state.list_entities_handler.handle(query).await?;

    Ok(Json(ApiResponse::success(EntityListResponse {
        kind: req.kind,
        total: items.len(),
        items,
    })))
}
