//! Caller authorization.
//!
//! Two trust domains map to two capabilities:
//! - `Management`: admins behind Cloudflare Access, proven by a signed JWT
//! - `Integration`: the digest bot, proven by a pre-shared API key
//!
//! Each route group is guarded by exactly one `Authorizer`; a credential for
//! the other capability never satisfies it.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Serialize;
use thiserror::Error;

pub mod access;
pub mod api_key;

pub use access::{AccessClaims, AccessTokenAuthorizer};
pub use api_key::ApiKeyAuthorizer;

pub const ACCESS_TOKEN_HEADER: &str = "cf-access-jwt-assertion";
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Management,
    Integration,
}

/// Authenticated caller, injected into request extensions by the auth middleware.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub capability: Capability,
    pub subject: String,
    pub email: Option<String>,
}

impl Principal {
    /// Name used in audit log lines.
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.subject)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} header is required")]
    MissingCredential(&'static str),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Invalid access token: {0}")]
    InvalidToken(String),

    #[error("Authentication is not configured for this endpoint")]
    NotConfigured,

    #[error("Failed to fetch signing keys: {0}")]
    KeyFetch(String),
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Capability granted on success.
    fn capability(&self) -> Capability;

    async fn authorize(&self, headers: &HeaderMap) -> Result<Principal, AuthError>;
}

/// Non-empty header value as a string slice.
pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, AuthError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingCredential(name))
}
