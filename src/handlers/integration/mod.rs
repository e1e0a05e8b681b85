// Integration handlers: called by the digest bot with the pre-shared API key.
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{ActivePrBubble, TrackEvent};
use crate::handlers::extract::{JsonBody, PrId, QueryParams};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct ActiveParams {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActiveList {
    pub items: Vec<ActivePrBubble>,
}

#[derive(Debug, Serialize)]
pub struct Tracked {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event: TrackEvent,
}

/// GET /api/pr/active - bubbles live right now, highest priority first
pub async fn active(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ActiveParams>,
) -> ApiResult<ActiveList> {
    let items = state.prs.active(params.limit.as_deref(), Utc::now()).await?;
    Ok(ApiResponse::success(ActiveList { items }))
}

/// POST /api/pr/:id/track - `{"type": "view" | "click"}`
pub async fn track(State(state): State<AppState>, PrId(id): PrId, JsonBody(payload): JsonBody) -> ApiResult<Tracked> {
    let event = state.prs.track(id, &payload).await?;
    tracing::debug!("PR {} {:?} tracked", id, event);
    Ok(ApiResponse::success(Tracked { id, event }))
}
