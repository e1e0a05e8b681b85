use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use thiserror::Error;

use super::sigv4::{amz_date, encode_path, sha256_hex, SigV4};
use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object storage credentials are not configured")]
    NotConfigured,

    #[error("invalid storage endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("request signing failed")]
    Signing,

    #[error("object storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("object storage returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// Write-only object store used by the upload endpoint.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `body` under `key` and return its public URL.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, StorageError>;
}

/// Cloudflare R2 (or any S3-compatible endpoint) over signed HTTP PUTs.
pub struct R2Storage {
    config: StorageConfig,
    client: reqwest::Client,
}

impl R2Storage {
    const REGION: &'static str = "auto";
    const SERVICE: &'static str = "s3";

    pub fn new(config: StorageConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl ObjectStorage for R2Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, StorageError> {
        let (Some(endpoint), Some(access_key_id), Some(secret_access_key)) = (
            self.config.endpoint_url(),
            self.config.access_key_id.as_deref().filter(|v| !v.is_empty()),
            self.config.secret_access_key.as_deref().filter(|v| !v.is_empty()),
        ) else {
            return Err(StorageError::NotConfigured);
        };

        let base = url::Url::parse(&endpoint).map_err(|e| StorageError::InvalidEndpoint(e.to_string()))?;
        let host = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(StorageError::InvalidEndpoint(endpoint)),
        };

        let canonical_uri = encode_path(&format!("/{}/{}", self.config.bucket, key));
        let target = format!("{}{}", endpoint, canonical_uri);

        let now = Utc::now();
        let payload_hash = sha256_hex(&body);
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host);
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), amz_date(now));

        let signer = SigV4 {
            access_key_id,
            secret_access_key,
            region: Self::REGION,
            service: Self::SERVICE,
        };
        let authorization = signer
            .authorization("PUT", &canonical_uri, &headers, &payload_hash, now)
            .map_err(|_| StorageError::Signing)?;

        tracing::debug!("PUT {} ({} bytes, {})", target, body.len(), content_type);

        let response = self
            .client
            .put(&target)
            .header("authorization", authorization)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date(now))
            .header("content-type", content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(self.config.public_url_for(key))
    }
}
