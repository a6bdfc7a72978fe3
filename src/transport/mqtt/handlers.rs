//! Connection lifecycle callbacks
//!
//! One callback per lifecycle event, handed to [`super::MqttClient::new`]
//! with the rest of the connection setup. The defaults only log.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// A message delivered by the broker without a matching subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

pub type MessageCallback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type ConnectionLostCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks invoked by the event loop for the lifetime of a connection
///
/// They observe the connection and never affect control flow.
#[derive(Clone)]
pub struct ConnectionHandlers {
    /// Any inbound publish; this client subscribes to nothing
    pub on_message: MessageCallback,
    /// Broker accepted the session
    pub on_connect: ConnectCallback,
    /// Established connection dropped unexpectedly
    pub on_connection_lost: ConnectionLostCallback,
}

impl ConnectionHandlers {
    pub fn on_message(mut self, callback: impl Fn(&InboundMessage) + Send + Sync + 'static) -> Self {
        self.on_message = Arc::new(callback);
        self
    }

    pub fn on_connect(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Arc::new(callback);
        self
    }

    pub fn on_connection_lost(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_connection_lost = Arc::new(callback);
        self
    }
}

impl Default for ConnectionHandlers {
    fn default() -> Self {
        Self {
            on_message: Arc::new(log_inbound_message),
            on_connect: Arc::new(|| info!("Connected")),
            on_connection_lost: Arc::new(|reason: &str| warn!("Connect lost: {}", reason)),
        }
    }
}

impl fmt::Debug for ConnectionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandlers").finish_non_exhaustive()
    }
}

fn log_inbound_message(message: &InboundMessage) {
    info!(
        topic = %message.topic,
        retain = message.retain,
        "Received message: {} from topic: {}",
        String::from_utf8_lossy(&message.payload),
        message.topic
    );
}
