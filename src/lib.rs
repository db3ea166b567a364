pub mod constraints;
pub mod db;
pub mod display;
pub mod refresh;
pub mod scheduler;
pub mod settings;
mod utils;
pub mod weather;
pub mod widgets;

use std::{env, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;

use db::Database;
use display::BroadcastDisplaySignal;
use refresh::RefreshJob;
use scheduler::{DeviceMonitor, RefreshScheduler};
use settings::SettingsStore;
use weather::{WeatherApiClient, DEFAULT_API_BASE_URL};
use widgets::WidgetLifecycle;

const DATA_DIR_ENV: &str = "ATMOS_DATA_DIR";
const API_URL_ENV: &str = "ATMOS_WEATHER_API_URL";
const DEFAULT_DATA_DIR: &str = "atmos-data";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub api_base_url: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var_os(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            api_base_url: env::var(API_URL_ENV)
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
        }
    }
}

/// Wired-up service. Hosts embedding the library keep this alive and feed
/// widget events into `widgets` and device changes into `monitor`.
pub struct AppState {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub display: BroadcastDisplaySignal,
    pub monitor: DeviceMonitor,
    pub job: RefreshJob,
    pub scheduler: Arc<RefreshScheduler>,
    pub widgets: WidgetLifecycle,
}

pub fn bootstrap(config: &ServiceConfig) -> Result<AppState> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("failed to create data directory {}", config.data_dir.display())
    })?;

    let db = Database::new(config.data_dir.join("atmos-widgets.sqlite3"))?;
    let settings = Arc::new(SettingsStore::new(config.data_dir.join("settings.json"))?);
    debug!("Widget settings: {:?}", settings.all_settings());

    let client = WeatherApiClient::new(config.api_base_url.clone(), settings.clone())?;
    let display = BroadcastDisplaySignal::new();
    let job = RefreshJob::new(
        Arc::new(db.clone()),
        Arc::new(client),
        Arc::new(display.clone()),
    );

    let monitor = DeviceMonitor::online();
    let scheduler = Arc::new(RefreshScheduler::new(
        job.clone(),
        settings.clone(),
        monitor.watch(),
    ));
    let widgets = WidgetLifecycle::new(db.clone(), settings.clone(), job.clone(), scheduler.clone());

    Ok(AppState {
        db,
        settings,
        display,
        monitor,
        job,
        scheduler,
        widgets,
    })
}

pub fn run() -> Result<()> {
    // RUST_LOG, when set, takes precedence over the info default.
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Atmos widget service starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(ServiceConfig::from_env()))
}

async fn serve(config: ServiceConfig) -> Result<()> {
    let state = bootstrap(&config)?;

    if state.settings.weather_api_key().is_empty() {
        warn!("No weather API key configured; refreshes will fail until one is set");
    }

    let mut refreshed = state.display.subscribe();
    tokio::spawn(async move {
        loop {
            match refreshed.recv().await {
                Ok(event) => info!("Widget {} refreshed at {}", event.target_id, event.refreshed_at),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {skipped} refresh notifications"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    state.widgets.on_enabled().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutting down widget refresh");
    state.scheduler.shutdown().await
}
