//! Integration tests for the OpenWeatherMap provider
//!
//! Tests behavioral contracts against a local HTTP stub:
//! - Request shape (path, location, units, language, key)
//! - Decoding of the current-weather response
//! - Error classification (auth, unknown location, server errors, bad bodies)
//! - Credentials never leak into error messages

use owm2mqtt::weather::{
    OpenWeatherMapConfig, OpenWeatherMapProvider, WeatherError, WeatherProvider,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-api-key-1234";

fn provider_for(server: &MockServer) -> OpenWeatherMapProvider {
    let config = OpenWeatherMapConfig {
        base_url: server.uri(),
        ..OpenWeatherMapConfig::new(API_KEY)
    };
    OpenWeatherMapProvider::new(config).unwrap()
}

fn berlin_body() -> serde_json::Value {
    serde_json::json!({
        "coord": {"lon": 13.41, "lat": 52.52},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
        "main": {"temp": 18.2, "feels_like": 17.6, "pressure": 1019, "humidity": 55},
        "dt": 1717243200,
        "sys": {"country": "DE"},
        "name": "Berlin",
        "cod": 200
    })
}

#[tokio::test]
async fn test_fetch_sends_metric_english_query_with_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Berlin,DE"))
        .and(query_param("units", "metric"))
        .and(query_param("lang", "en"))
        .and(query_param("appid", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(berlin_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let snapshot = provider_for(&mock_server)
        .current_by_name("Berlin,DE")
        .await
        .unwrap();

    assert_eq!(snapshot.temperature, 18.2);
    assert_eq!(snapshot.humidity, 55);
    assert_eq!(snapshot.location, "Berlin,DE");
    assert_eq!(snapshot.city.as_deref(), Some("Berlin"));
    assert_eq!(snapshot.country.as_deref(), Some("DE"));
    assert_eq!(snapshot.description.as_deref(), Some("clear sky"));
}

#[tokio::test]
async fn test_invalid_key_is_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "cod": 401,
            "message": "Invalid API key. Please see https://openweathermap.org/faq#error401 for more info."
        })))
        .mount(&mock_server)
        .await;

    let error = provider_for(&mock_server)
        .current_by_name("Berlin,DE")
        .await
        .unwrap_err();

    match error {
        WeatherError::Unauthorized(message) => assert!(message.starts_with("Invalid API key")),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_location_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "cod": "404",
            "message": "city not found"
        })))
        .mount(&mock_server)
        .await;

    let error = provider_for(&mock_server)
        .current_by_name("Atlantis")
        .await
        .unwrap_err();

    assert!(matches!(error, WeatherError::LocationNotFound(ref location) if location == "Atlantis"));
    assert_eq!(error.to_string(), "Location not found: Atlantis");
}

#[tokio::test]
async fn test_server_error_keeps_status_and_redacts_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string(format!("internal error handling appid={API_KEY}")),
        )
        .mount(&mock_server)
        .await;

    let error = provider_for(&mock_server)
        .current_by_name("Berlin,DE")
        .await
        .unwrap_err();

    match &error {
        WeatherError::Api { status, message } => {
            assert_eq!(*status, 500);
            assert!(message.contains("appid=***"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(!error.to_string().contains(API_KEY));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let error = provider_for(&mock_server)
        .current_by_name("Berlin,DE")
        .await
        .unwrap_err();

    assert!(matches!(error, WeatherError::Decode(_)));
}

#[tokio::test]
async fn test_unreachable_service_is_http_error_without_key() {
    // Bind then release a port so nothing listens on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = OpenWeatherMapConfig {
        base_url: format!("http://127.0.0.1:{port}"),
        ..OpenWeatherMapConfig::new(API_KEY)
    };
    let provider = OpenWeatherMapProvider::new(config).unwrap();

    let error = provider.current_by_name("Berlin,DE").await.unwrap_err();

    assert!(matches!(error, WeatherError::Http(_)));
    assert!(!error.to_string().contains(API_KEY));
}
