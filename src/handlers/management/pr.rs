use axum::{extract::State, Extension};

use crate::app::AppState;
use crate::auth::Principal;
use crate::database::models::{PrBubble, PrPage, PrStats};
use crate::handlers::extract::{JsonBody, PrId, QueryParams};
use crate::middleware::{ApiResponse, ApiResult};
use crate::validation::ListParams;

/// GET /api/pr - paginated listing with optional status filter
pub async fn list(State(state): State<AppState>, QueryParams(params): QueryParams<ListParams>) -> ApiResult<PrPage> {
    let page = state.prs.list(&params).await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/pr/:id
pub async fn get(State(state): State<AppState>, PrId(id): PrId) -> ApiResult<PrBubble> {
    Ok(ApiResponse::success(state.prs.get(id).await?))
}

/// POST /api/pr
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    JsonBody(payload): JsonBody,
) -> ApiResult<PrBubble> {
    let pr = state.prs.create(&payload).await?;
    tracing::info!("PR {} created by {}", pr.id, principal.display_name());
    Ok(ApiResponse::created(pr))
}

/// PUT /api/pr/:id - partial update; omitted fields keep their stored values
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    PrId(id): PrId,
    JsonBody(payload): JsonBody,
) -> ApiResult<PrBubble> {
    let pr = state.prs.update(id, &payload).await?;
    tracing::info!("PR {} updated by {}", id, principal.display_name());
    Ok(ApiResponse::success(pr))
}

/// DELETE /api/pr/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    PrId(id): PrId,
) -> ApiResult<()> {
    state.prs.delete(id).await?;
    tracing::info!("PR {} deleted by {}", id, principal.display_name());
    Ok(ApiResponse::no_content())
}

/// POST /api/pr/:id/duplicate - copy as a new draft
pub async fn duplicate(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    PrId(id): PrId,
) -> ApiResult<PrBubble> {
    let copy = state.prs.duplicate(id).await?;
    tracing::info!("PR {} duplicated as {} by {}", id, copy.id, principal.display_name());
    Ok(ApiResponse::created(copy))
}

/// GET /api/pr/:id/stats
pub async fn stats(State(state): State<AppState>, PrId(id): PrId) -> ApiResult<PrStats> {
    Ok(ApiResponse::success(state.prs.stats(id).await?))
}
