//! Widget target model.
//!
//! A target is one placed widget instance. Its id comes from the launcher and
//! is never generated here. Without a location the widget is unconfigured and
//! the refresh job leaves it alone.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::weather::WeatherPayload;

pub type TargetId = u32;

/// Cached data older than this is not shown; the widget falls back to its
/// loading state until the next successful refresh.
pub const DATA_MAX_AGE_MINUTES: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: TargetId,
    /// Place name or `"lat,lon"`.
    pub location: Option<String>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub cached_result: Option<WeatherPayload>,
}

impl Target {
    pub fn configured_location(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|location| !location.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.configured_location().is_some()
    }

    pub fn data_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_refreshed_at.map(|at| now - at)
    }

    /// True when there is no cached payload or it is at least `max_age` old.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        if self.cached_result.is_none() {
            return true;
        }
        match self.data_age(now) {
            Some(age) => age >= max_age,
            None => true,
        }
    }
}
