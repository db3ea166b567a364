use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::time::Duration;

use crate::{
    db::{Database, TargetId, DATA_MAX_AGE_MINUTES},
    refresh::{RefreshJob, RefreshOutcome},
    scheduler::RefreshScheduler,
    settings::SettingsStore,
    weather::WeatherPayload,
};

/// Catch-up run after the first widget is placed, so it does not wait a
/// full period for data.
pub const ENABLED_CATCH_UP_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub enum LocationChoice {
    /// Place name or coordinates typed by the user.
    Named(String),
    /// The device's last known coordinates, captured at configuration time.
    CurrentLocation,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "state", content = "weather")]
pub enum DisplayState {
    Fresh(WeatherPayload),
    Loading,
}

/// Reacts to widget host events: placement, removal, configuration.
pub struct WidgetLifecycle {
    db: Database,
    settings: Arc<SettingsStore>,
    job: RefreshJob,
    scheduler: Arc<RefreshScheduler>,
}

impl WidgetLifecycle {
    pub fn new(
        db: Database,
        settings: Arc<SettingsStore>,
        job: RefreshJob,
        scheduler: Arc<RefreshScheduler>,
    ) -> Self {
        Self {
            db,
            settings,
            job,
            scheduler,
        }
    }

    /// First widget placed.
    pub async fn on_enabled(&self) -> Result<()> {
        let interval = self.scheduler.schedule_periodic(None).await?;
        self.scheduler.schedule_one_time(ENABLED_CATCH_UP_DELAY).await;
        info!(
            "Widget updates enabled: every {} min, first catch-up in {}s",
            interval.as_secs() / 60,
            ENABLED_CATCH_UP_DELAY.as_secs()
        );
        Ok(())
    }

    /// Last widget removed.
    pub async fn on_disabled(&self) -> Result<()> {
        self.scheduler.cancel_periodic().await
    }

    pub async fn on_deleted(&self, target_ids: &[TargetId]) -> Result<()> {
        for &target_id in target_ids {
            self.db
                .delete_target(target_id)
                .await
                .with_context(|| format!("failed to remove widget {target_id}"))?;
            info!("Removed stored data for widget {target_id}");
        }
        Ok(())
    }

    /// Re-registers periodic work so a changed interval or Wi-Fi/battery
    /// preference takes effect. No-op while updates are disabled.
    pub async fn on_settings_changed(&self) -> Result<()> {
        if self.scheduler.is_periodic_scheduled().await {
            self.scheduler.schedule_periodic(None).await?;
        }
        Ok(())
    }

    /// Stores the widget's location and refreshes it immediately. The
    /// returned outcome is informational; the location is saved either way.
    pub async fn configure(
        &self,
        target_id: TargetId,
        choice: LocationChoice,
    ) -> Result<Option<RefreshOutcome>> {
        let location = self.resolve_location(choice)?;
        self.db
            .upsert_target_location(target_id, location.clone())
            .await?;
        info!("Widget {target_id} configured for {location}");

        let outcome = self.job.refresh_target_by_id(target_id).await?;
        if outcome == Some(RefreshOutcome::Failure) {
            warn!("Initial refresh for widget {target_id} failed; periodic work will retry");
        }
        Ok(outcome)
    }

    fn resolve_location(&self, choice: LocationChoice) -> Result<String> {
        match choice {
            LocationChoice::Named(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    bail!("enter a location or use the current location");
                }
                Ok(trimmed.to_string())
            }
            LocationChoice::CurrentLocation => self
                .settings
                .current_location()
                .map(|coordinates| coordinates.to_query())
                .ok_or_else(|| anyhow!("current location is not available yet")),
        }
    }

    /// Cached weather while it is younger than the freshness window,
    /// otherwise the loading placeholder.
    pub async fn display_state(&self, target_id: TargetId, now: DateTime<Utc>) -> Result<DisplayState> {
        let Some(target) = self.db.get_target(target_id).await? else {
            return Ok(DisplayState::Loading);
        };

        if target.is_stale(now, ChronoDuration::minutes(DATA_MAX_AGE_MINUTES)) {
            return Ok(DisplayState::Loading);
        }

        Ok(target
            .cached_result
            .map_or(DisplayState::Loading, DisplayState::Fresh))
    }
}
