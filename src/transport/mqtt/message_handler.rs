//! Pure message routing logic for MQTT events
//!
//! This module contains pure functions that turn raw event loop events into
//! routing decisions for the client task.

use super::handlers::InboundMessage;
use rumqttc::{Event, Outgoing, Packet};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Publish(_)) => EventRoute::PublishWritten,
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectWritten,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Whether the event loop should keep polling after a route (pure function)
    pub fn continues_after(route: &EventRoute) -> bool {
        !matches!(
            route,
            EventRoute::Disconnected | EventRoute::DisconnectWritten
        )
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish
    ConnectionAcknowledged,
    /// Broker pushed a message
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// MQTT broker disconnected
    Disconnected,
    /// A queued publish was written to the socket
    PublishWritten,
    /// Our DISCONNECT was written; the session is over
    DisconnectWritten,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Other outgoing event (handled automatically)
    OutgoingEvent,
}

impl EventRoute {
    /// Inbound message carried by this route, if any
    pub fn into_inbound_message(self) -> Option<InboundMessage> {
        match self {
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => Some(InboundMessage {
                topic,
                payload,
                retain,
            }),
            _ => None,
        }
    }
}
