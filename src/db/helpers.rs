//! Timestamps are stored as RFC 3339 text with millisecond precision.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

pub fn to_column(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn from_column(raw: Option<String>, column: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("column {column} holds an invalid timestamp: {raw:?}"))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}
