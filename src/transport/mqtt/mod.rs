//! MQTT client publishing Wiren Board device state
//!
//! This module separates pure functions from I/O operations for better
//! testability.
//!
//! # Architecture
//!
//! - [`connection`] - Pure connection state management and configuration
//! - [`message_handler`] - Pure event routing
//! - [`handlers`] - Lifecycle callbacks for connect, connection loss and inbound messages
//! - [`client`] - Impure I/O operations and coordination
//!
//! # Usage
//!
//! ```rust,no_run
//! use owm2mqtt::config::MqttSettings;
//! use owm2mqtt::protocol::TopicMessage;
//! use owm2mqtt::transport::mqtt::{ConnectionHandlers, MqttClient, DISCONNECT_GRACE};
//!
//! # tokio_test::block_on(async {
//! let settings = MqttSettings {
//!     host: "127.0.0.1".to_string(),
//!     port: 1883,
//!     username: None,
//!     password: None,
//! };
//!
//! let mut client = MqttClient::new(settings, ConnectionHandlers::default())?;
//! client.connect().await?;
//! let token = client
//!     .publish(&TopicMessage::retained("devices/weather/meta/name", "Weather"))
//!     .await?;
//! token.wait().await?;
//! client.disconnect(DISCONNECT_GRACE).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod handlers;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{
    configure_mqtt_options, ConnectionState, MqttError, CLIENT_ID, CONNECT_TIMEOUT,
    DISCONNECT_GRACE, KEEP_ALIVE,
};
pub use handlers::{ConnectionHandlers, InboundMessage};
pub use message_handler::{EventRoute, MessageHandler};
