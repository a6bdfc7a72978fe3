//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for connection state management and
//! broker option construction.

use crate::config::MqttSettings;
use rumqttc::{MqttOptions, QoS};
use std::time::Duration;
use thiserror::Error;

/// Fixed client identifier presented to the broker
pub const CLIENT_ID: &str = "owm2mqtt";

/// Keep-alive interval negotiated with the broker
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Upper bound for TCP connect plus CONNACK
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long disconnect waits for outstanding work
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// Capacity of the request channel between client handle and event loop
pub const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Delivery level for device state publishes
pub const PUBLISH_QOS: QoS = QoS::AtMostOnce;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Broker acknowledged the session
    Connected,
    /// Disconnected with reason
    Disconnected(String),
}

impl ConnectionState {
    /// Check if connection state allows publishing (pure function)
    pub fn can_publish(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker address: {0:?}")]
    InvalidBroker(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Pure function to configure MQTT options from settings
///
/// Credentials are set only when a username is present; the password is
/// applied as given, including empty.
pub fn configure_mqtt_options(
    settings: &MqttSettings,
    client_id: &str,
) -> Result<MqttOptions, MqttError> {
    if settings.host.trim().is_empty() {
        return Err(MqttError::InvalidBroker(settings.host.clone()));
    }

    let mut mqtt_options = MqttOptions::new(client_id, settings.host.as_str(), settings.port);

    if let Some(username) = &settings.username {
        let password = settings.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username.as_str(), password);
    }

    mqtt_options.set_keep_alive(KEEP_ALIVE);
    mqtt_options.set_clean_session(true);

    Ok(mqtt_options)
}
