//! Types for content-source pages and errors

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property values the source uses when it could not resolve a field
const PLACEHOLDERS: [&str; 4] = ["", "n/a", "null", "-"];

/// Longest description kept from a page
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

/// A raw entity page as served by the content source.
///
/// The engine never assumes a schema beyond "a map of named properties". All stringly-typed
/// access goes through the accessors below, which treat missing and placeholder values as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    /// The source-assigned page id, used as the external correlation id.
    pub id: String,
    /// Untyped property map
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Free-form page body, when the source exposes it
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "lastEditedTime")]
    pub last_edited_time: Option<DateTime<Utc>>,
}

impl RawPage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builder-style property setter
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    fn present(&self, name: &str) -> Option<&Value> {
        match self.properties.get(name)? {
            Value::Null => None,
            Value::String(s) if is_placeholder(s) => None,
            value => Some(value),
        }
    }

    /// Text value of a property. Numbers and booleans are rendered, arrays are joined.
    pub fn text(&self, name: &str) -> Option<String> {
        let text = match self.present(name)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(_) => {
                let items = self.list(name);
                if items.is_empty() {
                    return None;
                }
                items.join(", ")
            }
            Value::Object(obj) => obj.get("name").and_then(Value::as_str)?.trim().to_string(),
            Value::Null => return None,
        };
        (!is_placeholder(&text)).then_some(text)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.present(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.present(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => {
                let cleaned = s.trim().replace(',', "");
                cleaned
                    .parse::<i64>()
                    .ok()
                    .or_else(|| cleaned.parse::<f64>().ok().map(|f| f.round() as i64))
            }
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.present(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "checked" | "1" => Some(true),
                "false" | "no" | "unchecked" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            _ => None,
        }
    }

    /// Date value, accepting `2024-03-05`, `2024-03-05T20:00:00Z` and `March 5, 2024`
    /// (optionally prefixed with `@`).
    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        let raw = match self.present(name)? {
            Value::Object(obj) => obj.get("start").and_then(Value::as_str)?.to_string(),
            _ => self.text(name)?,
        };
        parse_date(&raw)
    }

    /// List value: a JSON array, or a comma-separated string.
    pub fn list(&self, name: &str) -> Vec<String> {
        let Some(value) = self.present(name) else {
            return Vec::new();
        };
        match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Object(obj) => obj
                        .get("name")
                        .and_then(Value::as_str)
                        .map(|s| s.trim().to_string()),
                    _ => None,
                })
                .filter(|s| !is_placeholder(s))
                .collect(),
            Value::String(s) => split_list(s),
            _ => Vec::new(),
        }
    }

    /// Ids of related pages: an array of ids or `{ "id": .. }` objects, or a comma-separated string.
    pub fn relation_ids(&self, name: &str) -> Vec<String> {
        match self.present(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Object(obj) => obj
                        .get("id")
                        .and_then(Value::as_str)
                        .map(|s| s.trim().to_string()),
                    _ => None,
                })
                .filter(|s| !is_placeholder(s))
                .collect(),
            Some(Value::String(s)) => split_list(s),
            _ => Vec::new(),
        }
    }

    /// The page's display name: `Name`, then `Title`, else "Unknown".
    pub fn name(&self) -> String {
        self.text("Name")
            .or_else(|| self.text("Title"))
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// `Description` truncated to [`MAX_DESCRIPTION_CHARS`]
    pub fn description(&self) -> Option<String> {
        self.text("Description").map(|d| truncate(&d, MAX_DESCRIPTION_CHARS))
    }
}

/// One cursor-linked batch of pages
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageBatch {
    #[serde(rename = "results")]
    pub pages: Vec<RawPage>,
    /// Cursor of the following batch, absent or empty on the last one
    #[serde(default)]
    pub next_cursor: Option<String>,
}

pub(crate) fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    PLACEHOLDERS
        .iter()
        .any(|placeholder| trimmed.eq_ignore_ascii_case(placeholder))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !is_placeholder(s))
        .map(str::to_string)
        .collect()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().trim_start_matches('@').trim();
    NaiveDate::parse_from_str(cleaned, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(cleaned, "%B %d, %Y"))
        .ok()
        .or_else(|| {
            cleaned
                .get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}

/// Truncate to `max` characters, ending in "..." when shortened.
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let kept: String = value.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Errors raised by content-source clients
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Content source returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Rate limited by content source")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing content source credentials")]
    MissingCredentials,

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Transient transport failures, 429 and 5xx are worth retrying; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::HttpError(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            SourceError::RateLimited { .. } => true,
            SourceError::JsonError(_)
            | SourceError::MissingCredentials
            | SourceError::InvalidResponse(_) => false,
        }
    }
}
