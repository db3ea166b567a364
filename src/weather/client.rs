use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use log::debug;
use serde::Deserialize;

use crate::{
    refresh::WeatherSource,
    settings::{SettingsStore, TemperatureUnit},
};

use super::payload::{WeatherIcon, WeatherPayload};

pub const DEFAULT_API_BASE_URL: &str = "https://api.weatherapi.com/v1";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    location: ApiLocation,
    current: ApiCurrent,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    temp_c: f64,
    temp_f: f64,
    feelslike_c: f64,
    feelslike_f: f64,
    humidity: f64,
    wind_kph: f64,
    condition: ApiCondition,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    text: String,
    icon: String,
}

/// Client for the WeatherAPI `current.json` endpoint.
///
/// The API key and temperature unit are read from settings on every request
/// so changes made in the app apply to the next refresh.
pub struct WeatherApiClient {
    http: reqwest::Client,
    base_url: String,
    settings: Arc<SettingsStore>,
}

impl WeatherApiClient {
    pub fn new(base_url: impl Into<String>, settings: Arc<SettingsStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settings,
        })
    }

    pub async fn fetch_current(&self, location: &str) -> Result<WeatherPayload> {
        let api_key = self.settings.weather_api_key();
        if api_key.is_empty() {
            bail!("weather API key is not configured");
        }

        let url = format!("{}/current.json", self.base_url);
        debug!("GET {url} q={location}");

        let response = self
            .http
            .get(&url)
            .query(&[("key", api_key.as_str()), ("q", location), ("aqi", "no")])
            .send()
            .await
            .with_context(|| format!("request for '{location}' failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("weather API returned HTTP {status} for '{location}'");
        }

        let body: CurrentResponse = response
            .json()
            .await
            .with_context(|| format!("invalid weather response for '{location}'"))?;

        Ok(to_payload(body, self.settings.temperature_unit()))
    }
}

fn format_temperature(celsius: f64, fahrenheit: f64, unit: TemperatureUnit) -> String {
    // Truncation matches what the app shows for the same reading.
    match unit {
        TemperatureUnit::Celsius => format!("{}°C", celsius.trunc() as i64),
        TemperatureUnit::Fahrenheit => format!("{}°F", fahrenheit.trunc() as i64),
    }
}

fn to_payload(body: CurrentResponse, unit: TemperatureUnit) -> WeatherPayload {
    let current = body.current;
    let temperature = format_temperature(current.temp_c, current.temp_f, unit);

    WeatherPayload {
        // current.json carries no forecast, so high/low mirror the current reading
        high_temp: temperature.clone(),
        low_temp: temperature.clone(),
        temperature,
        condition: current.condition.text,
        location: body.location.name,
        last_updated: Local::now().format("%-I:%M %p").to_string(),
        icon: WeatherIcon::from_icon_hint(&current.condition.icon),
        humidity: format!("{}%", current.humidity.trunc() as i64),
        wind_speed: format!("{} km/h", current.wind_kph.trunc() as i64),
        feels_like: format_temperature(current.feelslike_c, current.feelslike_f, unit),
    }
}

#[async_trait]
impl WeatherSource for WeatherApiClient {
    async fn fetch(&self, location: &str) -> Result<Option<WeatherPayload>> {
        self.fetch_current(location).await.map(Some)
    }
}
