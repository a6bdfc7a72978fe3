//! Wiren Board device topic construction
//!
//! A device lives under `devices/<device>/` with a human-readable name at
//! `meta/name` and one topic per control at `controls/<control>`, each
//! control described by `meta/type` and `meta/readonly` subtopics.
//! Device names pass through unmodified.

use crate::weather::WeatherSnapshot;
use serde::Serialize;

/// Root of the device registry namespace
pub const DEVICES_ROOT: &str = "devices";

/// Control carrying the temperature reading
pub const TEMPERATURE_CONTROL: &str = "temperature";

/// Control carrying the relative humidity reading
pub const HUMIDITY_CONTROL: &str = "humidity";

/// `meta/type` value for a temperature control
pub const TEMPERATURE_TYPE: &str = "temperature";

/// `meta/type` value for a relative humidity control
pub const REL_HUMIDITY_TYPE: &str = "rel_humidity";

/// `meta/readonly` value marking a control as read-only
pub const READONLY_MARKER: &str = "1";

/// One retained (or not) MQTT message ready for publishing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl TopicMessage {
    /// Retained message, the default for device state
    pub fn retained(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: true,
        }
    }
}

/// Topic paths for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    base: String,
}

impl DeviceTopics {
    pub fn new(device: &str) -> Self {
        Self {
            base: format!("{DEVICES_ROOT}/{device}"),
        }
    }

    /// `devices/<device>`
    pub fn base(&self) -> &str {
        &self.base
    }

    /// `devices/<device>/meta/name`
    pub fn name_topic(&self) -> String {
        format!("{}/meta/name", self.base)
    }

    /// `devices/<device>/controls/<control>`
    pub fn control_topic(&self, control: &str) -> String {
        format!("{}/controls/{control}", self.base)
    }

    /// `devices/<device>/controls/<control>/meta/<key>`
    pub fn control_meta_topic(&self, control: &str, key: &str) -> String {
        format!("{}/controls/{control}/meta/{key}", self.base)
    }

    /// Value topic plus its `readonly` and `type` meta topics
    fn readonly_control(&self, control: &str, value: String, kind: &str) -> [TopicMessage; 3] {
        [
            TopicMessage::retained(self.control_topic(control), value),
            TopicMessage::retained(
                self.control_meta_topic(control, "readonly"),
                READONLY_MARKER,
            ),
            TopicMessage::retained(self.control_meta_topic(control, "type"), kind),
        ]
    }
}

/// Temperature payload: fixed six decimals, no unit
pub fn format_temperature(celsius: f64) -> String {
    format!("{celsius:.6}")
}

/// Humidity payload: bare integer
pub fn format_humidity(percent: i64) -> String {
    percent.to_string()
}

/// Build the ordered device messages for one snapshot
///
/// Produces, under `devices/<device>/`: `meta/name`, the temperature control
/// with its `readonly` and `type` metadata, then the humidity control with
/// the same. Values are formatted without validation.
pub fn build_device_messages(
    device: &str,
    label: &str,
    snapshot: &WeatherSnapshot,
) -> Vec<TopicMessage> {
    let topics = DeviceTopics::new(device);

    let mut messages = Vec::with_capacity(7);
    messages.push(TopicMessage::retained(topics.name_topic(), label));
    messages.extend(topics.readonly_control(
        TEMPERATURE_CONTROL,
        format_temperature(snapshot.temperature),
        TEMPERATURE_TYPE,
    ));
    messages.extend(topics.readonly_control(
        HUMIDITY_CONTROL,
        format_humidity(snapshot.humidity),
        REL_HUMIDITY_TYPE,
    ));
    messages
}
