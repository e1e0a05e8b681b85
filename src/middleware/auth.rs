use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::auth::Authorizer;
use crate::error::ApiError;

/// Guard a route group with one authorizer and inject the resulting
/// `Principal` into request extensions.
pub async fn require_capability(
    State(authorizer): State<Arc<dyn Authorizer>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = authorizer.authorize(request.headers()).await.map_err(|e| {
        tracing::debug!(
            "{:?} credential rejected for {} {}: {}",
            authorizer.capability(),
            request.method(),
            request.uri().path(),
            e
        );
        ApiError::from(e)
    })?;

    if principal.capability != authorizer.capability() {
        return Err(ApiError::unauthorized("Credential does not grant access to this endpoint"));
    }

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
