//! Weather provider abstraction
//!
//! The bridge only needs "current conditions for a named location". Keeping
//! that behind a trait lets the orchestrator run against a stub in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current conditions returned by one fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: i64,
    /// The location string that was queried
    pub location: String,
    /// City name as resolved by the service
    pub city: Option<String>,
    /// ISO country code as resolved by the service
    pub country: Option<String>,
    /// Time the service observed these conditions
    pub observed_at: Option<DateTime<Utc>>,
    /// Atmospheric pressure in hPa
    pub pressure: Option<f64>,
    /// Perceived temperature in degrees Celsius
    pub feels_like: Option<f64>,
    /// Short textual description, e.g. "light rain"
    pub description: Option<String>,
}

impl WeatherSnapshot {
    /// Snapshot carrying only the values the bridge publishes
    pub fn new(location: impl Into<String>, temperature: f64, humidity: i64) -> Self {
        Self {
            temperature,
            humidity,
            location: location.into(),
            city: None,
            country: None,
            observed_at: None,
            pressure: None,
            feels_like: None,
            description: None,
        }
    }
}

/// Weather service errors
#[derive(Debug, Clone, Error)]
pub enum WeatherError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Invalid API key: {0}")]
    Unauthorized(String),
    #[error("Location not found: {0}")]
    LocationNotFound(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Source of current weather conditions
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Provider name, used in logs
    fn name(&self) -> &str;

    /// Fetch current conditions for a location such as `Moscow,RU`
    async fn current_by_name(&self, location: &str) -> Result<WeatherSnapshot, WeatherError>;
}
