//! Observability for the bridge
//!
//! Structured logging setup and span helpers.

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{mqtt_span, weather_span};
