//! Test utilities: an RS256 token minter for the Access authorizer, storage
//! doubles, and a router harness over the in-memory repository.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use jsonwebtoken::{jwk::JwkSet, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceExt;

use crate::app::{build_router, AppState};
use crate::auth::{AccessTokenAuthorizer, ApiKeyAuthorizer, ACCESS_TOKEN_HEADER, API_KEY_HEADER};
use crate::config::AppConfig;
use crate::database::MemoryPrBubbleRepository;
use crate::services::{ObjectStorage, PrService, StorageError};

pub const TEST_TEAM_DOMAIN: &str = "test-team.cloudflareaccess.com";
pub const TEST_AUDIENCE: &str = "test-audience-tag";
pub const TEST_API_KEY: &str = "test-bot-key";
pub const TEST_ADMIN_EMAIL: &str = "admin@example.com";

const TEST_SECRET_KEY: &str = "test-secret-key";
const TEST_KEY_ID: &str = "test-key";
const PRIVATE_KEY_PEM: &[u8] = include_bytes!("fixtures/access_test_key.pem");
const PUBLISHED_KEYS: &str = include_str!("fixtures/access_certs.json");

/// Public half of the fixture key pair, as Access publishes it.
pub fn published_keys() -> JwkSet {
    serde_json::from_str(PUBLISHED_KEYS).expect("fixture key set")
}

/// Authorizer that trusts the fixture key pair.
pub fn access_authorizer() -> AccessTokenAuthorizer {
    AccessTokenAuthorizer::with_static_keys(TEST_TEAM_DOMAIN, TEST_AUDIENCE, published_keys())
}

#[derive(Serialize)]
struct TokenClaims<'a> {
    sub: &'a str,
    email: &'a str,
    iss: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Sign a token the way Cloudflare Access does. Negative `ttl_secs` yields
/// an already expired token.
pub fn mint_access_token(email: &str, audience: &str, ttl_secs: i64) -> String {
    mint_access_token_with_kid(email, audience, ttl_secs, TEST_KEY_ID)
}

/// Same as `mint_access_token` but advertising another key id.
pub fn mint_access_token_with_kid(email: &str, audience: &str, ttl_secs: i64, kid: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = TokenClaims {
        sub: "test-subject",
        email,
        iss: format!("https://{}", TEST_TEAM_DOMAIN),
        aud: audience,
        iat: now,
        exp: now + ttl_secs,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY_PEM).expect("fixture private key");
    jsonwebtoken::encode(&header, &claims, &key).expect("token signing")
}

pub fn access_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_str(token).expect("token header"));
    headers
}

/// Headers carrying a valid management token.
pub fn admin_headers() -> HeaderMap {
    access_headers(&mint_access_token(TEST_ADMIN_EMAIL, TEST_AUDIENCE, 300))
}

pub fn api_key_headers(key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(API_KEY_HEADER, HeaderValue::from_str(key).expect("api key header"));
    headers
}

/// Headers carrying the valid bot key.
pub fn bot_headers() -> HeaderMap {
    api_key_headers(TEST_API_KEY)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

/// Storage double that keeps every PUT in memory.
#[derive(Default)]
pub struct RecordingStorage {
    objects: Mutex<Vec<StoredObject>>,
}

impl RecordingStorage {
    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().expect("storage lock").clone()
    }
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, StorageError> {
        self.objects.lock().expect("storage lock").push(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: body.len(),
        });
        Ok(format!("https://cdn.test/{}", key))
    }
}

/// Storage double whose provider always answers 503.
pub struct FailingStorage;

#[async_trait]
impl ObjectStorage for FailingStorage {
    async fn put_object(&self, _key: &str, _body: Bytes, _content_type: &str) -> Result<String, StorageError> {
        Err(StorageError::Upstream {
            status: 503,
            body: "SlowDown".to_string(),
        })
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `Value::Null` when the body is empty.
    pub body: Value,
}

/// Router over in-memory collaborators, driven with `oneshot`.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryPrBubbleRepository>,
    pub storage: Arc<RecordingStorage>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config(&[]))
    }

    pub fn with_config(config: AppConfig) -> Self {
        let storage = Arc::new(RecordingStorage::default());
        Self::build(config, storage.clone(), storage)
    }

    pub fn with_storage(storage: Arc<dyn ObjectStorage>) -> Self {
        Self::build(test_config(&[]), storage, Arc::new(RecordingStorage::default()))
    }

    fn build(config: AppConfig, storage: Arc<dyn ObjectStorage>, recorder: Arc<RecordingStorage>) -> Self {
        let repo = Arc::new(MemoryPrBubbleRepository::new());
        let state = AppState {
            config: Arc::new(config),
            prs: PrService::new(repo.clone()),
            storage,
            management: Arc::new(access_authorizer()),
            integration: Arc::new(ApiKeyAuthorizer::new(TEST_API_KEY, TEST_SECRET_KEY)),
        };

        Self {
            router: build_router(state),
            repo,
            storage: recorder,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.expect("response body").to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("JSON response body")
        };

        TestResponse { status, headers, body }
    }

    pub async fn request(&self, method: Method, uri: &str, headers: HeaderMap, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, headers: HeaderMap) -> TestResponse {
        self.request(Method::GET, uri, headers, None).await
    }

    /// Multipart upload with a single `file` part.
    pub async fn upload(&self, headers: HeaderMap, filename: &str, content_type: &str, data: &[u8]) -> TestResponse {
        const BOUNDARY: &str = "----pr-bubble-test-boundary";

        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let mut builder = Request::builder().method(Method::POST).uri("/api/upload/image");
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        let request = builder
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .expect("request");

        self.send(request).await
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for router tests; identity settings match the fixture keys.
pub fn test_config(overrides: &[(&str, &str)]) -> AppConfig {
    let mut pairs: Vec<(String, String)> = vec![
        ("API_KEY".to_string(), TEST_API_KEY.to_string()),
        ("SECRET_KEY".to_string(), TEST_SECRET_KEY.to_string()),
        ("CF_ACCESS_TEAM_DOMAIN".to_string(), TEST_TEAM_DOMAIN.to_string()),
        ("CF_ACCESS_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
    ];
    pairs.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    AppConfig::from_lookup(move |key| {
        pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
}
