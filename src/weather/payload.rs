use serde::{Deserialize, Serialize};

/// Icon family a widget renders for the current condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum WeatherIcon {
    Sunny,
    PartlyCloudy,
    Cloudy,
    Rain,
    Snow,
    Thunderstorm,
    #[default]
    Default,
}

impl WeatherIcon {
    /// Classifies a provider icon URL such as
    /// `//cdn.weatherapi.com/weather/64x64/day/116.png` or a named icon.
    pub fn from_icon_hint(hint: &str) -> Self {
        let hint = hint.to_ascii_lowercase();
        // "partly" has to win over "cloudy"; the rest is first match.
        if hint.contains("partly") {
            WeatherIcon::PartlyCloudy
        } else if hint.contains("sunny") || hint.contains("clear") {
            WeatherIcon::Sunny
        } else if hint.contains("cloudy") {
            WeatherIcon::Cloudy
        } else if hint.contains("rain") {
            WeatherIcon::Rain
        } else if hint.contains("snow") {
            WeatherIcon::Snow
        } else if hint.contains("storm") || hint.contains("thunder") {
            WeatherIcon::Thunderstorm
        } else {
            WeatherIcon::Default
        }
    }
}

/// Display-ready weather for one widget. Values are preformatted strings
/// (`"21°C"`, `"64%"`) so renderers never redo unit handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeatherPayload {
    pub temperature: String,
    pub condition: String,
    pub location: String,
    pub last_updated: String,
    #[serde(default)]
    pub icon: WeatherIcon,
    pub high_temp: String,
    pub low_temp: String,
    pub humidity: String,
    pub wind_speed: String,
    pub feels_like: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_hints_map_to_families() {
        assert_eq!(WeatherIcon::from_icon_hint("clear-day"), WeatherIcon::Sunny);
        assert_eq!(
            WeatherIcon::from_icon_hint("partly-cloudy-night"),
            WeatherIcon::PartlyCloudy
        );
        assert_eq!(WeatherIcon::from_icon_hint("cloudy"), WeatherIcon::Cloudy);
        assert_eq!(WeatherIcon::from_icon_hint("light-rain"), WeatherIcon::Rain);
        assert_eq!(WeatherIcon::from_icon_hint("thunderstorm"), WeatherIcon::Thunderstorm);
        assert_eq!(WeatherIcon::from_icon_hint("thunder-rain"), WeatherIcon::Rain);
        assert_eq!(WeatherIcon::from_icon_hint("snow-storm"), WeatherIcon::Snow);
        assert_eq!(
            WeatherIcon::from_icon_hint("//cdn.weatherapi.com/weather/64x64/day/116.png"),
            WeatherIcon::Default
        );
    }

    #[test]
    fn payload_without_icon_deserializes_to_default() {
        let json = r#"{
            "temperature": "12°C",
            "condition": "Overcast",
            "location": "Calgary",
            "lastUpdated": "9:15 AM",
            "highTemp": "12°C",
            "lowTemp": "12°C",
            "humidity": "80%",
            "windSpeed": "14 km/h",
            "feelsLike": "10°C"
        }"#;

        let payload: WeatherPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.icon, WeatherIcon::Default);
        assert_eq!(payload.location, "Calgary");
    }
}
