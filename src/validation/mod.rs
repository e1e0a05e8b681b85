//! Request validation for PR bubble payloads.
//!
//! Validators are pure: they take the decoded JSON body and return either the
//! normalized domain value or every violated field at once, so an admin form
//! can be fixed in a single round trip.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::database::models::{
    ListQuery, ListSort, NewPrBubble, PrBubblePatch, PrStatus, TagType, TrackEvent,
};

pub const MAX_TITLE: usize = 40;
pub const MAX_DESCRIPTION: usize = 100;
pub const MAX_URL: usize = 500;
pub const MAX_TAG_TEXT: usize = 50;
pub const MAX_UTM_CAMPAIGN: usize = 100;

pub const DEFAULT_TAG_TEXT: &str = "GIZMART";
pub const DEFAULT_TAG_COLOR: &str = "#FF1BE8";

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;
pub const MAX_ACTIVE_LIMIT: u32 = 50;

const READ_ONLY_FIELDS: [&str; 5] = ["id", "view_count", "click_count", "created_at", "updated_at"];

const WRITABLE_FIELDS: [&str; 12] = [
    "title",
    "description",
    "image_url",
    "link_url",
    "tag_type",
    "tag_text",
    "tag_color",
    "start_date",
    "end_date",
    "priority",
    "status",
    "utm_campaign",
];

/// Field name to message, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    /// Record a violation; the first message for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// Walks a JSON object collecting parsed fields and violations.
struct PayloadReader<'a> {
    object: &'a Map<String, Value>,
    errors: FieldErrors,
}

impl<'a> PayloadReader<'a> {
    fn new(payload: &'a Value) -> Result<Self, FieldErrors> {
        let object = payload
            .as_object()
            .ok_or_else(|| FieldErrors::single("body", "must be a JSON object"))?;

        let mut errors = FieldErrors::default();
        for key in object.keys() {
            if READ_ONLY_FIELDS.contains(&key.as_str()) {
                errors.add(key.clone(), "field is read-only");
            } else if !WRITABLE_FIELDS.contains(&key.as_str()) {
                errors.add(key.clone(), "unknown field");
            }
        }

        Ok(Self { object, errors })
    }

    /// Parse `field` if present. Absent fields yield `None` silently.
    fn optional<T>(&mut self, field: &str, parse: impl FnOnce(&Value) -> Result<T, String>) -> Option<T> {
        let value = self.object.get(field)?;
        match parse(value) {
            Ok(v) => Some(v),
            Err(message) => {
                self.errors.add(field, message);
                None
            }
        }
    }

    fn required<T>(&mut self, field: &str, parse: impl FnOnce(&Value) -> Result<T, String>) -> Option<T> {
        if !self.object.contains_key(field) {
            self.errors.add(field, "field is required");
            return None;
        }
        self.optional(field, parse)
    }
}

const CONTROL_CHARS: &str = "must not contain control characters";

/// NUL and other C0/C1 controls; tab and line breaks are allowed.
fn has_control_chars(s: &str) -> bool {
    s.chars().any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
}

fn text(max: usize) -> impl Fn(&Value) -> Result<String, String> {
    move |value| match value {
        Value::String(s) if s.trim().is_empty() => Err("must not be empty".to_string()),
        Value::String(s) if s.chars().count() > max => Err(format!("must be at most {} characters", max)),
        Value::String(s) if has_control_chars(s) => Err(CONTROL_CHARS.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Null => Err("must not be null".to_string()),
        _ => Err("must be a string".to_string()),
    }
}

fn nullable_text(max: usize) -> impl Fn(&Value) -> Result<Option<String>, String> {
    move |value| match value {
        Value::Null => Ok(None),
        Value::String(s) if s.chars().count() > max => Err(format!("must be at most {} characters", max)),
        Value::String(s) if has_control_chars(s) => Err(CONTROL_CHARS.to_string()),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err("must be a string or null".to_string()),
    }
}

/// `#RRGGBB`, normalized to upper case.
pub fn parse_color(value: &Value) -> Result<String, String> {
    const MESSAGE: &str = "must be a HEX color like #FF1BE8";
    let s = match value {
        Value::String(s) => s,
        Value::Null => return Err("must not be null".to_string()),
        _ => return Err(MESSAGE.to_string()),
    };

    match s.strip_prefix('#') {
        Some(hex) if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            Ok(format!("#{}", hex.to_ascii_uppercase()))
        }
        _ => Err(MESSAGE.to_string()),
    }
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, String> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| "must be an RFC 3339 timestamp".to_string()),
        Value::Null => Err("must not be null".to_string()),
        _ => Err("must be an RFC 3339 timestamp".to_string()),
    }
}

fn parse_priority(value: &Value) -> Result<Option<i32>, String> {
    const MESSAGE: &str = "must be a non-negative integer";
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .filter(|v| *v >= 0)
            .and_then(|v| i32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| MESSAGE.to_string()),
        _ => Err(MESSAGE.to_string()),
    }
}

fn one_of<T: FromStr>(allowed: &'static [&'static str]) -> impl Fn(&Value) -> Result<T, String> {
    move |value| match value.as_str().map(str::parse::<T>) {
        Some(Ok(parsed)) => Ok(parsed),
        _ => Err(format!("must be one of: {}", allowed.join(", "))),
    }
}

const STATUS_VALUES: &[&str] = &["draft", "active", "inactive"];
const TAG_TYPE_VALUES: &[&str] = &["gizmart", "custom"];
const TRACK_VALUES: &[&str] = &["view", "click"];

/// Active window check; `end_date` equal to `start_date` is allowed.
pub fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), FieldErrors> {
    if end < start {
        return Err(window_error());
    }
    Ok(())
}

/// Field error reported when a write would end a bubble before it starts.
pub fn window_error() -> FieldErrors {
    FieldErrors::single("end_date", "must not be before start_date")
}

/// Validate a create payload, applying defaults for optional fields.
pub fn validate_create(payload: &Value) -> Result<NewPrBubble, FieldErrors> {
    let mut reader = PayloadReader::new(payload)?;

    let title = reader.required("title", text(MAX_TITLE));
    let description = reader.required("description", text(MAX_DESCRIPTION));
    let image_url = reader.required("image_url", text(MAX_URL));
    let link_url = reader.required("link_url", text(MAX_URL));
    let tag_type = reader.optional("tag_type", one_of::<TagType>(TAG_TYPE_VALUES));
    let tag_text = reader.optional("tag_text", text(MAX_TAG_TEXT));
    let tag_color = reader.optional("tag_color", parse_color);
    let start_date = reader.required("start_date", parse_timestamp);
    let end_date = reader.required("end_date", parse_timestamp);
    let priority = reader.optional("priority", parse_priority);
    let status = reader.optional("status", one_of::<PrStatus>(STATUS_VALUES));
    let utm_campaign = reader.optional("utm_campaign", nullable_text(MAX_UTM_CAMPAIGN));

    let mut errors = reader.errors;
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if let Err(window) = check_window(start, end) {
            errors.0.extend(window.0);
        }
    }

    match (title, description, image_url, link_url, start_date, end_date) {
        (Some(title), Some(description), Some(image_url), Some(link_url), Some(start_date), Some(end_date))
            if errors.is_empty() =>
        {
            Ok(NewPrBubble {
                title,
                description,
                image_url,
                link_url,
                tag_type: tag_type.unwrap_or(TagType::Gizmart),
                tag_text: tag_text.unwrap_or_else(|| DEFAULT_TAG_TEXT.to_string()),
                tag_color: tag_color.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
                start_date,
                end_date,
                priority: priority.flatten(),
                status: status.unwrap_or(PrStatus::Draft),
                utm_campaign: utm_campaign.flatten(),
            })
        }
        _ => Err(errors),
    }
}

/// Validate a partial update. Window ordering is checked by the caller once
/// the patch has been merged into the stored record.
pub fn validate_update(payload: &Value) -> Result<PrBubblePatch, FieldErrors> {
    let mut reader = PayloadReader::new(payload)?;

    let patch = PrBubblePatch {
        title: reader.optional("title", text(MAX_TITLE)),
        description: reader.optional("description", text(MAX_DESCRIPTION)),
        image_url: reader.optional("image_url", text(MAX_URL)),
        link_url: reader.optional("link_url", text(MAX_URL)),
        tag_type: reader.optional("tag_type", one_of::<TagType>(TAG_TYPE_VALUES)),
        tag_text: reader.optional("tag_text", text(MAX_TAG_TEXT)),
        tag_color: reader.optional("tag_color", parse_color),
        start_date: reader.optional("start_date", parse_timestamp),
        end_date: reader.optional("end_date", parse_timestamp),
        priority: reader.optional("priority", parse_priority),
        status: reader.optional("status", one_of::<PrStatus>(STATUS_VALUES)),
        utm_campaign: reader.optional("utm_campaign", nullable_text(MAX_UTM_CAMPAIGN)),
    };

    let mut errors = reader.errors;
    if let (Some(start), Some(end)) = (patch.start_date, patch.end_date) {
        if let Err(window) = check_window(start, end) {
            errors.0.extend(window.0);
        }
    }

    errors.into_result(patch)
}

/// Body of a tracking call: `{"type": "view" | "click"}`.
pub fn validate_track(payload: &Value) -> Result<TrackEvent, FieldErrors> {
    let value = payload
        .get("type")
        .ok_or_else(|| FieldErrors::single("type", "field is required"))?;
    one_of::<TrackEvent>(TRACK_VALUES)(value).map_err(|message| FieldErrors::single("type", message))
}

/// Raw listing parameters as they arrive in the query string.
#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

pub fn validate_list_params(params: &ListParams) -> Result<ListQuery, FieldErrors> {
    let mut errors = FieldErrors::default();

    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(s) => match s.parse::<PrStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                errors.add("status", format!("must be one of: {}", STATUS_VALUES.join(", ")));
                None
            }
        },
    };

    let sort = match params.sort.as_deref() {
        None | Some("") | Some("created_at") => ListSort::CreatedAt,
        Some("priority") => ListSort::Priority,
        Some(_) => {
            errors.add("sort", "must be one of: created_at, priority");
            ListSort::CreatedAt
        }
    };

    let page = match params.page.as_deref() {
        None => 1,
        Some(raw) => match raw.parse::<u32>() {
            Ok(page) if page >= 1 => page,
            _ => {
                errors.add("page", "must be an integer >= 1");
                1
            }
        },
    };

    let limit = match params.limit.as_deref() {
        None => DEFAULT_PAGE_LIMIT,
        Some(raw) => parse_limit(raw, MAX_PAGE_LIMIT).unwrap_or_else(|message| {
            errors.add("limit", message);
            DEFAULT_PAGE_LIMIT
        }),
    };

    errors.into_result(ListQuery { status, sort, page, limit })
}

/// Optional `limit` for the bot's active listing.
pub fn validate_active_limit(raw: Option<&str>) -> Result<Option<u32>, FieldErrors> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_limit(raw, MAX_ACTIVE_LIMIT)
            .map(Some)
            .map_err(|message| FieldErrors::single("limit", message)),
    }
}

fn parse_limit(raw: &str, max: u32) -> Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(limit) if (1..=max).contains(&limit) => Ok(limit),
        _ => Err(format!("must be an integer between 1 and {}", max)),
    }
}
