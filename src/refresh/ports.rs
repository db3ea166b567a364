//! Collaborators the refresh job talks to. Production wiring uses the SQLite
//! [`Database`](crate::db::Database), the HTTP
//! [`WeatherApiClient`](crate::weather::WeatherApiClient), the broadcast
//! [`BroadcastDisplaySignal`](crate::display::BroadcastDisplaySignal) and the
//! JSON [`SettingsStore`](crate::settings::SettingsStore).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    constraints::{derive_constraints, Constraints},
    db::{Target, TargetId},
    weather::WeatherPayload,
};

/// Persistence for widget targets, keyed by target id.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Every target the store knows about, configured or not.
    async fn list_configured_targets(&self) -> Result<Vec<Target>>;

    async fn save_result(
        &self,
        target_id: TargetId,
        payload: &WeatherPayload,
        refreshed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn location(&self, target_id: TargetId) -> Result<Option<String>>;
}

/// Source of current weather for a place name or `"lat,lon"` pair.
///
/// `Ok(None)` and `Err(_)` are both treated as a failed fetch; the error only
/// carries detail for the logs.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<Option<WeatherPayload>>;
}

/// One-way "this widget has new data" signal to whatever draws widgets.
pub trait DisplaySignal: Send + Sync {
    fn notify_refreshed(&self, target_id: TargetId) -> Result<()>;
}

/// User preferences the scheduler reads before every (re)schedule.
pub trait UpdateSettingsProvider: Send + Sync {
    fn max_attempts(&self) -> u32;
    fn wifi_only(&self) -> bool;
    fn battery_optimized(&self) -> bool;
    fn update_interval(&self) -> Duration;

    fn constraints(&self) -> Constraints {
        derive_constraints(self.wifi_only(), self.battery_optimized())
    }
}
