// Public handlers: no credential required.
//
// Health checks for the hosting platform plus the click redirect that chat users
// follow from a rendered bubble.
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::handlers::extract::PrId;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub database: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub database: bool,
    pub storage_configured: bool,
    pub access_configured: bool,
}

pub async fn root() -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "name": "PR Bubble API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/api/health (public)",
            "readiness": "/api/readiness (public)",
            "redirect": "/api/pr/:id/redirect (public)",
            "pr": "/api/pr[/:id] (management)",
            "upload": "/api/upload/image (management)",
            "active": "/api/pr/active (integration)",
            "track": "/api/pr/:id/track (integration)",
        }
    }))
}

/// GET /api/health - 200 while the database answers, 503 otherwise
pub async fn health(State(state): State<AppState>) -> ApiResult<Health> {
    if let Err(e) = state.prs.ping().await {
        tracing::warn!("Health check failed: {}", e);
        return Err(ApiError::service_unavailable("Database unavailable"));
    }

    Ok(ApiResponse::success(Health {
        status: "healthy",
        database: "connected",
        timestamp: Utc::now(),
    }))
}

/// GET /api/readiness
pub async fn readiness(State(state): State<AppState>) -> Response {
    let database = state.prs.ping().await.is_ok();
    let body = Readiness {
        ready: database,
        database,
        storage_configured: state.config.storage.has_credentials(),
        access_configured: state.config.auth.access_configured() || state.config.auth.dev_bypass,
    };

    let status = if database { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(json!({ "success": database, "data": body }))).into_response()
}

/// GET /api/pr/:id/redirect - count a click and forward to the tagged link
pub async fn redirect(State(state): State<AppState>, PrId(id): PrId) -> Result<Response, ApiError> {
    let target = state.prs.redirect(id, Utc::now()).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response())
}
