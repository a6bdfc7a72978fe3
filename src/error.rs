//! Error types for the weather bridge
//!
//! Every failure a run can hit maps onto one [`BridgeError`] variant. All of
//! them are fatal for the process; `main` turns them into an exit status.

use crate::config::ConfigError;
use crate::transport::DeliveryError;
use crate::weather::WeatherError;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Top-level error for one bridge run
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("OpenWeatherMap Error: {0}")]
    Weather(#[from] WeatherError),

    #[error("MQTT Error: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("MQTT Error: {0}")]
    Publish(#[from] DeliveryError),

    #[error("MQTT disconnect failed: {0}")]
    Disconnect(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BridgeError {
    /// Wrap a transport connect failure
    pub fn connect<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connect(Box::new(error))
    }

    /// Wrap a transport disconnect failure
    pub fn disconnect<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Disconnect(Box::new(error))
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Error text safe to write to the log
    pub fn to_log_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(appid|password|api_?key|key|token|secret)([=:]\s*)[^&\s)]+")
            .expect("secret redaction pattern is valid")
    })
}

/// Redact credentials from an error message and cap its length
///
/// Request URLs embed the API key as `appid=...`, and reqwest includes the
/// URL in its error text.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = secret_pattern()
        .replace_all(message, "${1}${2}***")
        .to_string();

    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_is_unprefixed() {
        let error = BridgeError::from(ConfigError::MissingLocation);
        assert_eq!(
            error.to_string(),
            "Location is not specified. Please check for command line options"
        );
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_weather_error_is_prefixed() {
        let error = BridgeError::from(WeatherError::LocationNotFound("Atlantis".to_string()));
        assert!(error.to_string().starts_with("OpenWeatherMap Error: "));
    }

    #[test]
    fn test_publish_error_is_prefixed() {
        let error = BridgeError::from(DeliveryError::new("devices/wb1/meta/name", "boom"));
        assert!(error.to_string().starts_with("MQTT Error: "));
        assert!(error.to_string().contains("devices/wb1/meta/name"));
    }

    #[test]
    fn test_sanitize_appid_in_url() {
        let message = "error sending request for url (https://api.openweathermap.org/data/2.5/weather?q=Berlin&units=metric&lang=en&appid=0123456789abcdef)";
        let sanitized = sanitize_error_message(message);

        assert!(!sanitized.contains("0123456789abcdef"));
        assert!(sanitized.contains("appid=***"));
        assert!(sanitized.contains("q=Berlin"));
    }

    #[test]
    fn test_sanitize_multiple_secrets() {
        let message = "Auth failed: password=pass1 api_key=key123 token: tok456";
        let sanitized = sanitize_error_message(message);

        assert!(!sanitized.contains("pass1"));
        assert!(!sanitized.contains("key123"));
        assert!(!sanitized.contains("tok456"));
        assert!(sanitized.contains("password=***"));
    }

    #[test]
    fn test_sanitize_case_insensitive() {
        let sanitized = sanitize_error_message("APPID=abc Password=xyz");
        assert!(!sanitized.contains("abc"));
        assert!(!sanitized.contains("xyz"));
    }

    #[test]
    fn test_sanitize_leaves_plain_text() {
        assert_eq!(sanitize_error_message(""), "");
        assert_eq!(
            sanitize_error_message("connection refused"),
            "connection refused"
        );
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));

        let exact = sanitize_error_message(&"x".repeat(500));
        assert_eq!(exact.len(), 500);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"ж".repeat(400));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }
}
