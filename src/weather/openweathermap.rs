//! OpenWeatherMap provider implementation
//!
//! Queries the current-weather endpoint once per call, in metric units with
//! English descriptions. There is no retry and no timeout beyond the HTTP
//! client's default.

use crate::error::sanitize_error_message;
use crate::weather::provider::{WeatherError, WeatherProvider, WeatherSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

/// Public OpenWeatherMap API root
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

const CURRENT_WEATHER_PATH: &str = "data/2.5/weather";

/// OpenWeatherMap provider configuration
#[derive(Debug, Clone)]
pub struct OpenWeatherMapConfig {
    pub api_key: String,
    pub base_url: String,
    /// `metric` yields Celsius
    pub units: String,
    pub lang: String,
}

impl OpenWeatherMapConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

impl Default for OpenWeatherMapConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            units: "metric".to_string(),
            lang: "en".to_string(),
        }
    }
}

/// OpenWeatherMap provider
pub struct OpenWeatherMapProvider {
    config: OpenWeatherMapConfig,
    endpoint: Url,
    client: Client,
}

impl OpenWeatherMapProvider {
    /// Create a new provider; fails if the API key is empty or the base URL is invalid
    pub fn new(config: OpenWeatherMapConfig) -> Result<Self, WeatherError> {
        if config.api_key.is_empty() {
            return Err(WeatherError::NotConfigured(
                "OpenWeatherMap API key is required".to_string(),
            ));
        }

        let endpoint = Self::endpoint_url(&config.base_url)?;
        let client = Client::builder()
            .build()
            .map_err(|e| WeatherError::Http(e.to_string()))?;

        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    /// Resolve the current-weather endpoint below a base URL (pure function)
    fn endpoint_url(base_url: &str) -> Result<Url, WeatherError> {
        let joined = format!("{}/{CURRENT_WEATHER_PATH}", base_url.trim_end_matches('/'));
        Url::parse(&joined).map_err(|e| {
            WeatherError::NotConfigured(format!("Invalid base URL {base_url}: {e}"))
        })
    }

    /// Build the request URL for a location (pure function)
    fn request_url(&self, location: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", location)
            .append_pair("units", &self.config.units)
            .append_pair("lang", &self.config.lang)
            .append_pair("appid", &self.config.api_key);
        url
    }

    /// Map a non-success status and body to an error (pure function)
    fn classify_error(status: StatusCode, body: &str, location: &str) -> WeatherError {
        let message = serde_json::from_str::<OwmErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| body.trim().to_string());
        let message = sanitize_error_message(&message);

        match status {
            StatusCode::UNAUTHORIZED => WeatherError::Unauthorized(message),
            StatusCode::NOT_FOUND => WeatherError::LocationNotFound(location.to_string()),
            other => WeatherError::Api {
                status: other.as_u16(),
                message,
            },
        }
    }

    /// Convert the wire response into a snapshot (pure function)
    fn parse_current_weather(body: &str, location: &str) -> Result<WeatherSnapshot, WeatherError> {
        let response: OwmCurrentResponse =
            serde_json::from_str(body).map_err(|e| WeatherError::Decode(e.to_string()))?;

        Ok(WeatherSnapshot {
            temperature: response.main.temp,
            humidity: response.main.humidity,
            location: location.to_string(),
            city: response.name.filter(|n| !n.is_empty()),
            country: response.sys.and_then(|s| s.country),
            observed_at: response
                .dt
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            pressure: response.main.pressure,
            feels_like: response.main.feels_like,
            description: response
                .weather
                .into_iter()
                .next()
                .and_then(|w| w.description),
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMapProvider {
    fn name(&self) -> &str {
        "openweathermap"
    }

    async fn current_by_name(&self, location: &str) -> Result<WeatherSnapshot, WeatherError> {
        debug!(location = %location, "Requesting current weather");

        let response = self
            .client
            .get(self.request_url(location))
            .send()
            .await
            .map_err(|e| {
                let message = sanitize_error_message(&e.to_string());
                error!("OpenWeatherMap request failed: {}", message);
                WeatherError::Http(message)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WeatherError::Http(sanitize_error_message(&e.to_string())))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body, location));
        }

        let snapshot = Self::parse_current_weather(&body, location)?;
        debug!(
            "OpenWeatherMap response for {}: {:.1}°C, {}% humidity",
            location, snapshot.temperature, snapshot.humidity
        );
        Ok(snapshot)
    }
}

#[derive(Debug, Deserialize)]
struct OwmCurrentResponse {
    main: OwmMain,
    #[serde(default)]
    weather: Vec<OwmCondition>,
    sys: Option<OwmSys>,
    name: Option<String>,
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: i64,
    feels_like: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwmSys {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwmErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOSCOW_BODY: &str = r#"{
        "coord": {"lon": 37.62, "lat": 55.75},
        "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}],
        "main": {"temp": 21.5, "feels_like": 21.1, "temp_min": 20.0, "temp_max": 22.8, "pressure": 1012, "humidity": 63},
        "dt": 1700000000,
        "sys": {"country": "RU", "sunrise": 1699937000, "sunset": 1699968000},
        "name": "Moscow",
        "cod": 200
    }"#;

    fn provider() -> OpenWeatherMapProvider {
        OpenWeatherMapProvider::new(OpenWeatherMapConfig::new("test-key")).unwrap()
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        let result = OpenWeatherMapProvider::new(OpenWeatherMapConfig::default());
        assert!(matches!(result, Err(WeatherError::NotConfigured(_))));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = OpenWeatherMapConfig {
            base_url: "not a url".to_string(),
            ..OpenWeatherMapConfig::new("key")
        };
        assert!(matches!(
            OpenWeatherMapProvider::new(config),
            Err(WeatherError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_request_url_carries_units_and_language() {
        let url = provider().request_url("Moscow,RU");

        assert_eq!(url.path(), "/data/2.5/weather");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(pairs.contains(&("q".to_string(), "Moscow,RU".to_string())));
        assert!(pairs.contains(&("units".to_string(), "metric".to_string())));
        assert!(pairs.contains(&("lang".to_string(), "en".to_string())));
        assert!(pairs.contains(&("appid".to_string(), "test-key".to_string())));
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let url = OpenWeatherMapProvider::endpoint_url("http://localhost:8080/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/data/2.5/weather");
    }

    #[test]
    fn test_parse_current_weather() {
        let snapshot = OpenWeatherMapProvider::parse_current_weather(MOSCOW_BODY, "Moscow,RU")
            .unwrap();

        assert_eq!(snapshot.temperature, 21.5);
        assert_eq!(snapshot.humidity, 63);
        assert_eq!(snapshot.location, "Moscow,RU");
        assert_eq!(snapshot.city.as_deref(), Some("Moscow"));
        assert_eq!(snapshot.country.as_deref(), Some("RU"));
        assert_eq!(snapshot.pressure, Some(1012.0));
        assert_eq!(snapshot.description.as_deref(), Some("broken clouds"));
        assert_eq!(
            snapshot.observed_at.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_parse_minimal_body() {
        let body = r#"{"main": {"temp": -3.25, "humidity": 90}}"#;
        let snapshot = OpenWeatherMapProvider::parse_current_weather(body, "Oslo,NO").unwrap();

        assert_eq!(snapshot.temperature, -3.25);
        assert_eq!(snapshot.humidity, 90);
        assert!(snapshot.city.is_none());
        assert!(snapshot.description.is_none());
    }

    #[test]
    fn test_parse_missing_humidity_fails() {
        let body = r#"{"main": {"temp": 10.0}}"#;
        let result = OpenWeatherMapProvider::parse_current_weather(body, "x");
        assert!(matches!(result, Err(WeatherError::Decode(_))));
    }

    #[test]
    fn test_classify_errors() {
        let unauthorized = OpenWeatherMapProvider::classify_error(
            StatusCode::UNAUTHORIZED,
            r#"{"cod": 401, "message": "Invalid API key. Please see https://openweathermap.org/faq#error401 for more info."}"#,
            "Berlin,DE",
        );
        assert!(matches!(unauthorized, WeatherError::Unauthorized(ref m) if m.starts_with("Invalid API key")));

        let not_found = OpenWeatherMapProvider::classify_error(
            StatusCode::NOT_FOUND,
            r#"{"cod": "404", "message": "city not found"}"#,
            "Atlantis",
        );
        assert!(matches!(not_found, WeatherError::LocationNotFound(ref l) if l == "Atlantis"));

        let server = OpenWeatherMapProvider::classify_error(
            StatusCode::BAD_GATEWAY,
            "upstream unavailable",
            "Berlin,DE",
        );
        assert!(matches!(
            server,
            WeatherError::Api { status: 502, ref message } if message == "upstream unavailable"
        ));
    }
}
