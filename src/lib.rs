//! owm2mqtt - OpenWeatherMap to MQTT bridge
//!
//! Fetches current conditions for one location and publishes them as a
//! read-only Wiren Board device: retained messages under
//! `devices/<device>/...` describing a temperature and a humidity control.
//! The program is meant to run from a timer; each invocation connects,
//! publishes, waits briefly for delivery confirmations and exits.
//!
//! # Quick Start
//!
//! ```rust
//! use owm2mqtt::protocol::build_device_messages;
//! use owm2mqtt::weather::WeatherSnapshot;
//!
//! let snapshot = WeatherSnapshot::new("Moscow,RU", 21.5, 63);
//! let messages = build_device_messages("weather1", "OpenWeatherMap Moscow,RU", &snapshot);
//!
//! assert_eq!(messages.len(), 7);
//! assert_eq!(messages[1].topic, "devices/weather1/controls/temperature");
//! assert_eq!(messages[1].payload, "21.500000");
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;
pub mod weather;

pub use bridge::{BridgeReport, WeatherBridge};
pub use config::{Args, BridgeConfig, ConfigError, MqttSettings};
pub use error::{BridgeError, BridgeResult};
pub use protocol::*;
pub use transport::mqtt::MqttClient;
