use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque subscriber identifier handed to us by the front end (e.g. a Telegram chat id).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Trims and upper-cases an asset symbol. Returns `None` for blank input.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// One user's price band on one asset.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Watch {
    pub id: Uuid,
    pub user_id: UserId,
    pub symbol: String,
    pub min_price: f64,
    pub max_price: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BreachKind {
    BelowMinimum,
    AtOrAboveMaximum,
}

impl BreachKind {
    pub fn label(self) -> &'static str {
        match self {
            BreachKind::BelowMinimum => "below minimum",
            BreachKind::AtOrAboveMaximum => "at/above maximum",
        }
    }
}

impl fmt::Display for BreachKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A triggered evaluation: the observed price and the bound it crossed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Breach {
    pub kind: BreachKind,
    pub price: f64,
    pub limit: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateWatchRequest {
    pub user_id: UserId,
    pub symbol: String,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveWatchResponse {
    pub symbol: String,
    pub removed: usize,
    pub tracked: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
}
