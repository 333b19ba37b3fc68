//! Queries over the tierview schema
//!
//! Functions take any SQLite executor so the same query runs against the pool
//! or inside an edit transaction (`&mut *tx`).

pub mod operation_log;
pub mod reviews;
pub mod sessions;
pub mod tiers;
pub mod users;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tierview_common::{Error, Result};

/// Parse a stored timestamp: RFC 3339 as written by this crate, or SQLite's
/// `CURRENT_TIMESTAMP` form for column defaults
pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}': {}", text, e)))
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}
