//! Device registry topic conventions
//!
//! Messages are laid out the way Wiren Board devices publish themselves, so
//! the weather readings appear as a regular read-only device.

pub mod topics;

pub use topics::{
    build_device_messages, format_humidity, format_temperature, DeviceTopics, TopicMessage,
};
