//! Mock implementations for testing
//!
//! Provides mock WeatherProvider and Transport implementations so the bridge
//! can be exercised without OpenWeatherMap or an MQTT broker.

use crate::protocol::TopicMessage;
use crate::transport::mqtt::{ConnectionState, MqttError};
use crate::transport::{DeliveryCompleter, DeliveryToken, Transport};
use crate::weather::{WeatherError, WeatherProvider, WeatherSnapshot};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock weather provider returning a canned snapshot or error
#[derive(Debug, Clone)]
pub struct MockWeatherProvider {
    pub result: Result<WeatherSnapshot, WeatherError>,
    pub requested_locations: Arc<Mutex<Vec<String>>>,
}

impl MockWeatherProvider {
    pub fn new(snapshot: WeatherSnapshot) -> Self {
        Self {
            result: Ok(snapshot),
            requested_locations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Provider answering every location with the given readings
    pub fn reading(temperature: f64, humidity: i64) -> Self {
        Self::new(WeatherSnapshot::new("mock", temperature, humidity))
    }

    pub fn with_failure(error: WeatherError) -> Self {
        Self {
            result: Err(error),
            requested_locations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn get_requested_locations(&self) -> Vec<String> {
        self.requested_locations.lock().await.clone()
    }
}

#[async_trait]
impl WeatherProvider for MockWeatherProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn current_by_name(&self, location: &str) -> Result<WeatherSnapshot, WeatherError> {
        self.requested_locations
            .lock()
            .await
            .push(location.to_string());

        self.result.clone().map(|snapshot| WeatherSnapshot {
            location: location.to_string(),
            ..snapshot
        })
    }
}

/// Mock transport for testing
///
/// Clones share their recorded state, so a test can keep one handle while
/// the bridge owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<TopicMessage>>>,
    pub connect_attempts: Arc<AtomicUsize>,
    pub disconnect_calls: Arc<AtomicUsize>,
    /// `connect` fails
    pub fail_connect: bool,
    /// Delivery of this topic is reported as failed
    pub fail_topic: Option<String>,
    /// Delivery tokens never resolve
    pub never_confirm: bool,
    connected: Arc<AtomicBool>,
    held_completers: Arc<Mutex<Vec<DeliveryCompleter>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_failure() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    pub fn with_delivery_failure(topic: impl Into<String>) -> Self {
        Self {
            fail_topic: Some(topic.into()),
            ..Default::default()
        }
    }

    pub fn without_confirmations() -> Self {
        Self {
            never_confirm: true,
            ..Default::default()
        }
    }

    pub async fn get_published_messages(&self) -> Vec<TopicMessage> {
        self.published_messages.lock().await.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_connect {
            return Err(MqttError::ConnectionFailedStr(
                "Mock connection failure".to_string(),
            ));
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, message: &TopicMessage) -> Result<DeliveryToken, Self::Error> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected {
                state: ConnectionState::Disconnected("Mock transport not connected".to_string()),
            });
        }

        self.published_messages.lock().await.push(message.clone());

        if self.fail_topic.as_deref() == Some(message.topic.as_str()) {
            let (completer, token) = DeliveryToken::pending(message.topic.as_str());
            completer.fail("Mock delivery failure");
            return Ok(token);
        }

        if self.never_confirm {
            let (completer, token) = DeliveryToken::pending(message.topic.as_str());
            self.held_completers.lock().await.push(completer);
            return Ok(token);
        }

        Ok(DeliveryToken::completed(message.topic.as_str(), Ok(())))
    }

    async fn disconnect(&mut self, _grace: Duration) -> Result<(), Self::Error> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
