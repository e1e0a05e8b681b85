use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Draft,
    Active,
    Inactive,
}

impl PrStatus {
    pub const ALL: [PrStatus; 3] = [PrStatus::Draft, PrStatus::Active, PrStatus::Inactive];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrStatus::Draft => "draft",
            PrStatus::Active => "active",
            PrStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for PrStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status '{}'", s))
    }
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Gizmart` is the predefined house tag; `Custom` carries free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagType {
    Gizmart,
    Custom,
}

impl TagType {
    pub const ALL: [TagType; 2] = [TagType::Gizmart, TagType::Custom];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagType::Gizmart => "gizmart",
            TagType::Custom => "custom",
        }
    }
}

impl FromStr for TagType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagType::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| format!("unknown tag type '{}'", s))
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter selected by a tracking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackEvent {
    View,
    Click,
}

impl TrackEvent {
    pub fn column(&self) -> &'static str {
        match self {
            TrackEvent::View => "view_count",
            TrackEvent::Click => "click_count",
        }
    }
}

impl FromStr for TrackEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(TrackEvent::View),
            "click" => Ok(TrackEvent::Click),
            other => Err(format!("unknown track type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrBubble {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub link_url: String,
    pub tag_type: TagType,
    pub tag_text: String,
    pub tag_color: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub priority: Option<i32>,
    pub status: PrStatus,
    pub utm_campaign: Option<String>,
    pub view_count: i64,
    pub click_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrBubble {
    /// Whether the bubble is deliverable to the bot at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PrStatus::Active && self.start_date <= now && now <= self.end_date
    }

    /// Content fields only; used when a patch is merged into a stored record.
    pub fn content(&self) -> NewPrBubble {
        NewPrBubble {
            title: self.title.clone(),
            description: self.description.clone(),
            image_url: self.image_url.clone(),
            link_url: self.link_url.clone(),
            tag_type: self.tag_type,
            tag_text: self.tag_text.clone(),
            tag_color: self.tag_color.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            priority: self.priority,
            status: self.status,
            utm_campaign: self.utm_campaign.clone(),
        }
    }
}

/// Raw `pr_bubbles` row; enums are stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct PrBubbleRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub link_url: String,
    pub tag_type: String,
    pub tag_text: String,
    pub tag_color: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub priority: Option<i32>,
    pub status: String,
    pub utm_campaign: Option<String>,
    pub view_count: i64,
    pub click_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PrBubbleRow> for PrBubble {
    type Error = DatabaseError;

    fn try_from(row: PrBubbleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            tag_type: row.tag_type.parse().map_err(DatabaseError::Decode)?,
            status: row.status.parse().map_err(DatabaseError::Decode)?,
            id: row.id,
            title: row.title,
            description: row.description,
            image_url: row.image_url,
            link_url: row.link_url,
            tag_text: row.tag_text,
            tag_color: row.tag_color,
            start_date: row.start_date,
            end_date: row.end_date,
            priority: row.priority,
            utm_campaign: row.utm_campaign,
            view_count: row.view_count,
            click_count: row.click_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Validated content of a bubble: everything except identity, counters and
/// audit timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrBubble {
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub link_url: String,
    pub tag_type: TagType,
    pub tag_text: String,
    pub tag_color: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub priority: Option<i32>,
    pub status: PrStatus,
    pub utm_campaign: Option<String>,
}

/// Field-level partial update. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrBubblePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub tag_type: Option<TagType>,
    pub tag_text: Option<String>,
    pub tag_color: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub priority: Option<Option<i32>>,
    pub status: Option<PrStatus>,
    pub utm_campaign: Option<Option<String>>,
}

impl PrBubblePatch {
    pub fn apply(self, mut content: NewPrBubble) -> NewPrBubble {
        if let Some(v) = self.title {
            content.title = v;
        }
        if let Some(v) = self.description {
            content.description = v;
        }
        if let Some(v) = self.image_url {
            content.image_url = v;
        }
        if let Some(v) = self.link_url {
            content.link_url = v;
        }
        if let Some(v) = self.tag_type {
            content.tag_type = v;
        }
        if let Some(v) = self.tag_text {
            content.tag_text = v;
        }
        if let Some(v) = self.tag_color {
            content.tag_color = v;
        }
        if let Some(v) = self.start_date {
            content.start_date = v;
        }
        if let Some(v) = self.end_date {
            content.end_date = v;
        }
        if let Some(v) = self.priority {
            content.priority = v;
        }
        if let Some(v) = self.status {
            content.status = v;
        }
        if let Some(v) = self.utm_campaign {
            content.utm_campaign = v;
        }
        content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSort {
    #[default]
    CreatedAt,
    Priority,
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub status: Option<PrStatus>,
    pub sort: ListSort,
    pub page: u32,
    pub limit: u32,
}

impl ListQuery {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrPage {
    pub items: Vec<PrBubble>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// The slice of a bubble the bot renders.
#[derive(Debug, Clone, Serialize)]
pub struct ActivePrBubble {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub link_url: String,
    pub tag_type: TagType,
    pub tag_text: String,
    pub tag_color: String,
    pub priority: Option<i32>,
    pub utm_campaign: Option<String>,
}

impl From<PrBubble> for ActivePrBubble {
    fn from(pr: PrBubble) -> Self {
        Self {
            id: pr.id,
            title: pr.title,
            description: pr.description,
            image_url: pr.image_url,
            link_url: pr.link_url,
            tag_type: pr.tag_type,
            tag_text: pr.tag_text,
            tag_color: pr.tag_color,
            priority: pr.priority,
            utm_campaign: pr.utm_campaign,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrStats {
    pub id: Uuid,
    pub title: String,
    pub view_count: i64,
    pub click_count: i64,
    /// Click-through rate in percent, two decimals.
    pub ctr: f64,
    pub created_at: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: PrStatus,
}

impl From<&PrBubble> for PrStats {
    fn from(pr: &PrBubble) -> Self {
        let ctr = if pr.view_count > 0 {
            let raw = pr.click_count as f64 / pr.view_count as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            id: pr.id,
            title: pr.title.clone(),
            view_count: pr.view_count,
            click_count: pr.click_count,
            ctr,
            created_at: pr.created_at,
            start_date: pr.start_date,
            end_date: pr.end_date,
            status: pr.status,
        }
    }
}
