//! In-memory collaborators for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::{Target, TargetId},
    weather::{WeatherIcon, WeatherPayload},
};

use super::{
    ports::{DisplaySignal, TargetStore, UpdateSettingsProvider, WeatherSource},
    RefreshJob,
};

pub fn payload(location: &str) -> WeatherPayload {
    WeatherPayload {
        temperature: "20°C".into(),
        condition: "Sunny".into(),
        location: location.into(),
        last_updated: "9:00 AM".into(),
        icon: WeatherIcon::Sunny,
        high_temp: "20°C".into(),
        low_temp: "20°C".into(),
        humidity: "40%".into(),
        wind_speed: "5 km/h".into(),
        feels_like: "19°C".into(),
    }
}

pub fn target(id: TargetId, location: Option<&str>) -> Target {
    Target {
        id,
        location: location.map(String::from),
        last_refreshed_at: None,
        cached_result: None,
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub targets: Vec<Target>,
    pub fail_listing: AtomicBool,
    pub fail_save_for: Option<TargetId>,
    pub saved: Mutex<HashMap<TargetId, DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn with_targets(targets: Vec<Target>) -> Self {
        Self {
            targets,
            ..Default::default()
        }
    }

    pub fn saved_ids(&self) -> Vec<TargetId> {
        let mut ids: Vec<_> = self.saved.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn list_configured_targets(&self) -> Result<Vec<Target>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(self.targets.clone())
    }

    async fn save_result(
        &self,
        target_id: TargetId,
        _payload: &WeatherPayload,
        refreshed_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.fail_save_for == Some(target_id) {
            bail!("disk full");
        }
        self.saved.lock().unwrap().insert(target_id, refreshed_at);
        Ok(())
    }

    async fn location(&self, target_id: TargetId) -> Result<Option<String>> {
        Ok(self
            .targets
            .iter()
            .find(|t| t.id == target_id)
            .and_then(|t| t.location.clone()))
    }
}

/// Succeeds unless the location is listed in `failing` or the call is one of
/// the first `fail_first`. The location `"panic"` panics.
#[derive(Default)]
pub struct ScriptedSource {
    pub failing: Vec<String>,
    pub fail_first: usize,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn failing(locations: &[&str]) -> Self {
        Self {
            failing: locations.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_first(calls: usize) -> Self {
        Self {
            fail_first: calls,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for ScriptedSource {
    async fn fetch(&self, location: &str) -> Result<Option<WeatherPayload>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if location == "panic" {
            panic!("parser blew up");
        }
        if call < self.fail_first {
            return Ok(None);
        }
        if self.failing.iter().any(|l| l == location) {
            return Err(anyhow!("HTTP 503"));
        }
        Ok(Some(payload(location)))
    }
}

/// Takes `latency` per fetch and remembers the most fetches ever running at
/// the same moment.
pub struct SlowSource {
    pub latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowSource {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for SlowSource {
    async fn fetch(&self, location: &str) -> Result<Option<WeatherPayload>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(payload(location)))
    }
}

#[derive(Default)]
pub struct RecordingDisplay {
    pub fail: bool,
    pub notified: Mutex<Vec<TargetId>>,
}

impl RecordingDisplay {
    pub fn notified(&self) -> Vec<TargetId> {
        let mut ids = self.notified.lock().unwrap().clone();
        ids.sort_unstable();
        ids
    }
}

impl DisplaySignal for RecordingDisplay {
    fn notify_refreshed(&self, target_id: TargetId) -> Result<()> {
        if self.fail {
            bail!("renderer gone");
        }
        self.notified.lock().unwrap().push(target_id);
        Ok(())
    }
}

pub struct FixedSettings {
    pub max_attempts: u32,
    pub wifi_only: bool,
    pub battery_optimized: bool,
    pub interval: Duration,
}

impl Default for FixedSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wifi_only: false,
            battery_optimized: true,
            interval: Duration::from_secs(30 * 60),
        }
    }
}

impl UpdateSettingsProvider for FixedSettings {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn wifi_only(&self) -> bool {
        self.wifi_only
    }

    fn battery_optimized(&self) -> bool {
        self.battery_optimized
    }

    fn update_interval(&self) -> Duration {
        self.interval
    }
}

pub struct Harness<S: TargetStore + 'static> {
    pub job: RefreshJob,
    pub store: Arc<S>,
    pub source: Arc<ScriptedSource>,
    pub display: Arc<RecordingDisplay>,
}

pub fn harness<S: TargetStore + 'static>(
    store: S,
    source: ScriptedSource,
    display: RecordingDisplay,
) -> Harness<S> {
    let store = Arc::new(store);
    let source = Arc::new(source);
    let display = Arc::new(display);
    let job = RefreshJob::new(store.clone(), source.clone(), display.clone());
    Harness {
        job,
        store,
        source,
        display,
    }
}
