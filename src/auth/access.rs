use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::HeaderMap;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{header_value, AuthError, Authorizer, Capability, Principal, ACCESS_TOKEN_HEADER};
use crate::config::AuthConfig;

/// Claims carried by a Cloudflare Access application token. Service tokens
/// carry no email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub iss: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Minimum gap between key set fetches triggered by an unknown `kid`.
const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

enum KeySource {
    /// Published key set, fetched on first use and again on unknown `kid`
    /// at most once per `MIN_REFETCH_INTERVAL`.
    Remote {
        client: reqwest::Client,
        certs_url: String,
        cached: RwLock<Option<CachedKeys>>,
    },
    Static(Arc<JwkSet>),
}

struct AccessSettings {
    issuer: String,
    audience: String,
}

/// Verifies `Cf-Access-Jwt-Assertion` tokens for admin endpoints.
pub struct AccessTokenAuthorizer {
    settings: Option<AccessSettings>,
    dev_bypass: bool,
    keys: KeySource,
}

impl AccessTokenAuthorizer {
    pub fn from_config(config: &AuthConfig, client: reqwest::Client) -> Self {
        let team_domain = config.cf_access_team_domain.clone().unwrap_or_default();
        let settings = config.access_configured().then(|| AccessSettings {
            issuer: format!("https://{}", team_domain),
            audience: config.cf_access_audience.clone().unwrap_or_default(),
        });

        Self {
            settings,
            dev_bypass: config.dev_bypass,
            keys: KeySource::Remote {
                client,
                certs_url: format!("https://{}/cdn-cgi/access/certs", team_domain),
                cached: RwLock::new(None),
            },
        }
    }

    /// Verify against a fixed key set instead of the published one.
    pub fn with_static_keys(team_domain: &str, audience: &str, keys: JwkSet) -> Self {
        Self {
            settings: Some(AccessSettings {
                issuer: format!("https://{}", team_domain),
                audience: audience.to_string(),
            }),
            dev_bypass: false,
            keys: KeySource::Static(Arc::new(keys)),
        }
    }

    async fn key_set(&self, refresh: bool) -> Result<Arc<JwkSet>, AuthError> {
        match &self.keys {
            KeySource::Static(keys) => Ok(Arc::clone(keys)),
            KeySource::Remote { client, certs_url, cached } => {
                if let Some(entry) = cached.read().await.as_ref() {
                    if !refresh || entry.fetched_at.elapsed() < MIN_REFETCH_INTERVAL {
                        return Ok(Arc::clone(&entry.keys));
                    }
                }

                let keys: JwkSet = client
                    .get(certs_url)
                    .send()
                    .await
                    .and_then(|resp| resp.error_for_status())
                    .map_err(|e| AuthError::KeyFetch(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

                if keys.keys.is_empty() {
                    return Err(AuthError::KeyFetch("no public keys published".to_string()));
                }

                tracing::debug!("Fetched {} signing keys from {}", keys.keys.len(), certs_url);
                let keys = Arc::new(keys);
                *cached.write().await = Some(CachedKeys {
                    keys: Arc::clone(&keys),
                    fetched_at: Instant::now(),
                });
                Ok(keys)
            }
        }
    }

    fn verify_with(
        token: &str,
        kid: Option<&str>,
        keys: &JwkSet,
        validation: &Validation,
    ) -> Option<Result<AccessClaims, AuthError>> {
        let candidates: Vec<_> = match kid {
            Some(kid) => keys.find(kid).into_iter().collect(),
            None => keys.keys.iter().collect(),
        };
        if candidates.is_empty() {
            return None;
        }

        let mut last_error = None;
        for jwk in candidates {
            let key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => key,
                Err(e) => {
                    last_error = Some(AuthError::InvalidToken(e.to_string()));
                    continue;
                }
            };
            match decode::<AccessClaims>(token, &key, validation) {
                Ok(data) => return Some(Ok(data.claims)),
                Err(e) => last_error = Some(AuthError::InvalidToken(e.to_string())),
            }
        }
        last_error.map(Err)
    }
}

#[async_trait]
impl Authorizer for AccessTokenAuthorizer {
    fn capability(&self) -> Capability {
        Capability::Management
    }

    async fn authorize(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let Some(settings) = &self.settings else {
            if self.dev_bypass {
                return Ok(Principal {
                    capability: Capability::Management,
                    subject: "dev".to_string(),
                    email: Some("dev@localhost".to_string()),
                });
            }
            tracing::error!("Cloudflare Access is not configured -- rejecting admin request");
            return Err(AuthError::NotConfigured);
        };

        let token = header_value(headers, ACCESS_TOKEN_HEADER)?;
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken("unexpected signing algorithm".to_string()));
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_issuer(&[settings.issuer.as_str()]);

        let kid = header.kid.as_deref();
        let keys = self.key_set(false).await?;
        let verified = match Self::verify_with(token, kid, &keys, &validation) {
            Some(result) => result,
            // Unknown kid: keys may have rotated since the last fetch.
            None => {
                let keys = self.key_set(true).await?;
                Self::verify_with(token, kid, &keys, &validation)
                    .unwrap_or_else(|| Err(AuthError::InvalidToken("unknown signing key".to_string())))
            }
        };

        let claims = verified.map_err(|e| {
            tracing::debug!("Access token rejected: {}", e);
            e
        })?;

        Ok(Principal {
            capability: Capability::Management,
            subject: claims.sub,
            email: claims.email,
        })
    }
}
