//! Current-conditions data for widgets.

pub mod client;
pub mod payload;

pub use client::{WeatherApiClient, DEFAULT_API_BASE_URL};
pub use payload::{WeatherIcon, WeatherPayload};
