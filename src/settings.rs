use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::refresh::UpdateSettingsProvider;

pub const DEFAULT_UPDATE_INTERVAL_MINUTES: u64 = 30;
pub const MIN_UPDATE_INTERVAL_MINUTES: u64 = 15;
pub const MAX_UPDATE_INTERVAL_MINUTES: u64 = 120;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const MIN_MAX_RETRIES: u32 = 1;
pub const MAX_MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// `"lat,lon"`, the query form the weather API accepts.
    pub fn to_query(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct UserSettings {
    update_interval_minutes: u64,
    battery_optimization: bool,
    wifi_only: bool,
    max_retries: u32,
    temperature_unit: TemperatureUnit,
    weather_api_key: String,
    current_location: Option<Coordinates>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            update_interval_minutes: DEFAULT_UPDATE_INTERVAL_MINUTES,
            battery_optimization: true,
            wifi_only: false,
            max_retries: DEFAULT_MAX_RETRIES,
            temperature_unit: TemperatureUnit::Celsius,
            weather_api_key: String::new(),
            current_location: None,
        }
    }
}

impl UserSettings {
    /// Values written by hand may be out of range; reads always see clamped ones.
    fn clamped(mut self) -> Self {
        self.update_interval_minutes = self
            .update_interval_minutes
            .clamp(MIN_UPDATE_INTERVAL_MINUTES, MAX_UPDATE_INTERVAL_MINUTES);
        self.max_retries = self.max_retries.clamp(MIN_MAX_RETRIES, MAX_MAX_RETRIES);
        self
    }
}

/// Widget update preferences persisted as `settings.json` in the data dir.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<UserSettings>(&contents)
                .unwrap_or_default()
                .clamped()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies `apply` to a copy and only keeps it once it is on disk.
    fn update(&self, apply: impl FnOnce(&mut UserSettings)) -> Result<()> {
        let mut guard = self.write();
        let mut next = guard.clone();
        apply(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    pub fn update_interval_minutes(&self) -> u64 {
        self.read().update_interval_minutes
    }

    pub fn set_update_interval_minutes(&self, minutes: u64) -> Result<()> {
        let clamped = minutes.clamp(MIN_UPDATE_INTERVAL_MINUTES, MAX_UPDATE_INTERVAL_MINUTES);
        self.update(|s| s.update_interval_minutes = clamped)
    }

    pub fn battery_optimization_enabled(&self) -> bool {
        self.read().battery_optimization
    }

    pub fn set_battery_optimization_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.battery_optimization = enabled)
    }

    pub fn wifi_only_enabled(&self) -> bool {
        self.read().wifi_only
    }

    pub fn set_wifi_only_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.wifi_only = enabled)
    }

    pub fn max_retries(&self) -> u32 {
        self.read().max_retries
    }

    pub fn set_max_retries(&self, max_retries: u32) -> Result<()> {
        let clamped = max_retries.clamp(MIN_MAX_RETRIES, MAX_MAX_RETRIES);
        self.update(|s| s.max_retries = clamped)
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        self.read().temperature_unit
    }

    pub fn set_temperature_unit(&self, unit: TemperatureUnit) -> Result<()> {
        self.update(|s| s.temperature_unit = unit)
    }

    pub fn weather_api_key(&self) -> String {
        self.read().weather_api_key.clone()
    }

    pub fn set_weather_api_key(&self, api_key: impl Into<String>) -> Result<()> {
        let api_key = api_key.into();
        self.update(|s| s.weather_api_key = api_key)
    }

    pub fn current_location(&self) -> Option<Coordinates> {
        self.read().current_location
    }

    pub fn set_current_location(&self, coordinates: Option<Coordinates>) -> Result<()> {
        self.update(|s| s.current_location = coordinates)
    }

    /// Flat key/value view for diagnostics. The API key is reported by length only.
    pub fn all_settings(&self) -> BTreeMap<&'static str, String> {
        let guard = self.read();
        BTreeMap::from([
            (
                "update_interval_minutes",
                guard.update_interval_minutes.to_string(),
            ),
            ("battery_optimization", guard.battery_optimization.to_string()),
            ("wifi_only", guard.wifi_only.to_string()),
            ("max_retries", guard.max_retries.to_string()),
            (
                "temperature_unit",
                format!("{:?}", guard.temperature_unit).to_lowercase(),
            ),
            (
                "weather_api_key_len",
                guard.weather_api_key.len().to_string(),
            ),
        ])
    }

    /// Restores the update preferences to defaults. The API key and the last
    /// known location are app data rather than preferences and are kept.
    pub fn reset_to_defaults(&self) -> Result<()> {
        self.update(|s| {
            let defaults = UserSettings::default();
            s.update_interval_minutes = defaults.update_interval_minutes;
            s.battery_optimization = defaults.battery_optimization;
            s.wifi_only = defaults.wifi_only;
            s.max_retries = defaults.max_retries;
        })
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.write() = data.clamped();
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

impl UpdateSettingsProvider for SettingsStore {
    fn max_attempts(&self) -> u32 {
        self.max_retries()
    }

    fn wifi_only(&self) -> bool {
        self.wifi_only_enabled()
    }

    fn battery_optimized(&self) -> bool {
        self.battery_optimization_enabled()
    }

    fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes() * 60)
    }
}
