use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{header_value, AuthError, Authorizer, Capability, Principal, API_KEY_HEADER};

type HmacSha256 = Hmac<Sha256>;

/// Pre-shared key check for the bot. Keys are compared as HMAC tags keyed
/// with the application secret so the comparison runs in constant time.
pub struct ApiKeyAuthorizer {
    secret: Vec<u8>,
    expected_tag: Option<Vec<u8>>,
}

impl ApiKeyAuthorizer {
    pub fn new(api_key: &str, secret_key: &str) -> Self {
        let secret = secret_key.as_bytes().to_vec();
        let expected_tag = if api_key.is_empty() {
            None
        } else {
            Self::tag(&secret, api_key).ok()
        };
        Self { secret, expected_tag }
    }

    fn mac(secret: &[u8]) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(secret).map_err(|_| AuthError::NotConfigured)
    }

    fn tag(secret: &[u8], value: &str) -> Result<Vec<u8>, AuthError> {
        let mut mac = Self::mac(secret)?;
        mac.update(value.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[async_trait]
impl Authorizer for ApiKeyAuthorizer {
    fn capability(&self) -> Capability {
        Capability::Integration
    }

    async fn authorize(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let Some(expected) = &self.expected_tag else {
            tracing::error!("API_KEY is not configured -- rejecting bot request");
            return Err(AuthError::NotConfigured);
        };

        let presented = header_value(headers, API_KEY_HEADER)?;

        let mut mac = Self::mac(&self.secret)?;
        mac.update(presented.as_bytes());
        mac.verify_slice(expected).map_err(|_| AuthError::InvalidApiKey)?;

        Ok(Principal {
            capability: Capability::Integration,
            subject: "bot".to_string(),
            email: None,
        })
    }
}
