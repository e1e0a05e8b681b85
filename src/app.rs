use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{self, AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{AccessTokenAuthorizer, ApiKeyAuthorizer, Authorizer};
use crate::config::{AppConfig, CorsOrigins};
use crate::database::PrBubbleRepository;
use crate::handlers::{integration, management, public};
use crate::middleware::require_capability;
use crate::services::{ObjectStorage, PrService, R2Storage};

/// Multipart framing allowance on top of the image size ceiling.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared handler state. Everything here is immutable or internally synchronized.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub prs: PrService,
    pub storage: Arc<dyn ObjectStorage>,
    pub management: Arc<dyn Authorizer>,
    pub integration: Arc<dyn Authorizer>,
}

impl AppState {
    /// Production wiring: R2 storage and Cloudflare Access key fetching share
    /// one HTTP client.
    pub fn new(config: AppConfig, repo: Arc<dyn PrBubbleRepository>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let storage = Arc::new(R2Storage::new(config.storage.clone(), client.clone()));
        let management = Arc::new(AccessTokenAuthorizer::from_config(&config.auth, client));
        let integration = Arc::new(ApiKeyAuthorizer::new(&config.auth.bot_api_key, &config.security.secret_key));

        Ok(Self {
            config: Arc::new(config),
            prs: PrService::new(repo),
            storage,
            management,
            integration,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.upload.max_bytes + MULTIPART_OVERHEAD;

    let management_routes = Router::new()
        .route("/api/pr", get(management::pr::list).post(management::pr::create))
        .route(
            "/api/pr/:id",
            get(management::pr::get)
                .put(management::pr::update)
                .delete(management::pr::delete),
        )
        .route("/api/pr/:id/duplicate", post(management::pr::duplicate))
        .route("/api/pr/:id/stats", get(management::pr::stats))
        .route(
            "/api/upload/image",
            post(management::upload::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.management),
            require_capability,
        ));

    let integration_routes = Router::new()
        // Static segment wins over `:id` when matching.
        .route("/api/pr/active", get(integration::active))
        .route("/api/pr/:id/track", post(integration::track))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.integration),
            require_capability,
        ));

    let public_routes = Router::new()
        .route("/", get(public::root))
        .route("/api/health", get(public::health))
        .route("/api/readiness", get(public::readiness))
        .route("/api/pr/:id/redirect", get(public::redirect));

    let cors = cors_layer(&state.config.security.cors_origins);

    Router::new()
        .merge(public_routes)
        .merge(management_routes)
        .merge(integration_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    match origins {
        CorsOrigins::Any => CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods(cors::Any)
            .allow_headers(cors::Any),
        CorsOrigins::List(list) => {
            let origins: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                        None
                    }
                })
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true)
        }
    }
}
