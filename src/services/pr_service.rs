use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::database::models::{ActivePrBubble, PrBubble, PrPage, PrStats, TrackEvent};
use crate::database::{DatabaseError, PrBubbleRepository};
use crate::error::ApiError;
use crate::validation::{self, FieldErrors, ListParams};

pub const UTM_SOURCE: &str = "line";
pub const UTM_MEDIUM: &str = "pr_bubble";

/// Parameters the redirect owns; any other query parameter is passed through.
const UTM_KEYS: [&str; 4] = ["utm_source", "utm_medium", "utm_campaign", "utm_content"];

#[derive(Debug, Error)]
pub enum PrServiceError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("link is not a redirectable URL: {0}")]
    InvalidLink(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<FieldErrors> for PrServiceError {
    fn from(errors: FieldErrors) -> Self {
        PrServiceError::Validation(errors)
    }
}

impl From<PrServiceError> for ApiError {
    fn from(err: PrServiceError) -> Self {
        match err {
            PrServiceError::Validation(errors) => ApiError::from(errors),
            PrServiceError::InvalidLink(reason) => {
                tracing::warn!("Refusing redirect: {}", reason);
                ApiError::bad_request("PR link URL is not redirectable")
            }
            PrServiceError::Database(e) => ApiError::from(e),
        }
    }
}

/// Business operations over the record store: validation, patch merging,
/// statistics and click redirects.
#[derive(Clone)]
pub struct PrService {
    repo: Arc<dyn PrBubbleRepository>,
}

impl PrService {
    pub fn new(repo: Arc<dyn PrBubbleRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, params: &ListParams) -> Result<PrPage, PrServiceError> {
        let query = validation::validate_list_params(params)?;
        Ok(self.repo.list(&query).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<PrBubble, PrServiceError> {
        Ok(self.repo.get(id).await?)
    }

    pub async fn create(&self, payload: &Value) -> Result<PrBubble, PrServiceError> {
        let new = validation::validate_create(payload)?;
        Ok(self.repo.create(new).await?)
    }

    /// Apply a partial update. The store merges it with the current row in
    /// one write and re-checks the active window against the result.
    pub async fn update(&self, id: Uuid, payload: &Value) -> Result<PrBubble, PrServiceError> {
        let patch = validation::validate_update(payload)?;
        match self.repo.update(id, patch).await {
            Err(DatabaseError::InvalidWindow(_)) => Err(validation::window_error().into()),
            result => Ok(result?),
        }
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), PrServiceError> {
        Ok(self.repo.delete(id).await?)
    }

    pub async fn duplicate(&self, id: Uuid) -> Result<PrBubble, PrServiceError> {
        Ok(self.repo.duplicate(id).await?)
    }

    pub async fn stats(&self, id: Uuid) -> Result<PrStats, PrServiceError> {
        let pr = self.repo.get(id).await?;
        Ok(PrStats::from(&pr))
    }

    pub async fn active(&self, limit: Option<&str>, now: DateTime<Utc>) -> Result<Vec<ActivePrBubble>, PrServiceError> {
        let limit = validation::validate_active_limit(limit)?;
        let items = self.repo.active(now, limit).await?;
        Ok(items.into_iter().map(ActivePrBubble::from).collect())
    }

    pub async fn track(&self, id: Uuid, payload: &Value) -> Result<TrackEvent, PrServiceError> {
        let event = validation::validate_track(payload)?;
        self.repo.track(id, event).await?;
        Ok(event)
    }

    /// Resolve the click-through target for a bubble and count the click.
    pub async fn redirect(&self, id: Uuid, now: DateTime<Utc>) -> Result<Url, PrServiceError> {
        let pr = self.repo.get(id).await?;
        let campaign = pr
            .utm_campaign
            .clone()
            .unwrap_or_else(|| format!("pr_{}", pr.id));
        let target = tracked_link(&pr.link_url, &campaign, now)
            .map_err(|reason| PrServiceError::InvalidLink(format!("{} ({})", reason, pr.id)))?;

        self.repo.track(id, TrackEvent::Click).await?;
        Ok(target)
    }

    pub async fn ping(&self) -> Result<(), PrServiceError> {
        Ok(self.repo.ping().await?)
    }
}

/// Link URL with UTM parameters for the digest channel appended. Existing
/// `utm_*` parameters are replaced; everything else keeps its order.
pub fn tracked_link(link: &str, campaign: &str, now: DateTime<Utc>) -> Result<Url, String> {
    let mut url = Url::parse(link).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".to_string());
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !UTM_KEYS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.set_query(None);
    url.query_pairs_mut()
        .extend_pairs(kept)
        .append_pair("utm_source", UTM_SOURCE)
        .append_pair("utm_medium", UTM_MEDIUM)
        .append_pair("utm_campaign", campaign)
        .append_pair("utm_content", &now.format("%Y%m%d_%H%MZ").to_string());

    Ok(url)
}
