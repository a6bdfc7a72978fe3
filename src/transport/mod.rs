//! Transport layer for publishing device messages
//!
//! This module provides the transport abstraction the bridge publishes
//! through, and the MQTT implementation in [`mqtt`].

use crate::protocol::TopicMessage;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

pub mod mqtt;

/// Transport trait for publishing device messages
///
/// This trait provides an abstraction over the broker connection to enable
/// dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker; resolves once the broker accepted the session
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Hand one message to the transport
    ///
    /// Returns as soon as the message is queued. The returned token resolves
    /// once delivery is confirmed or has failed.
    async fn publish(&self, message: &TopicMessage) -> Result<DeliveryToken, Self::Error>;

    /// Orderly disconnect, waiting at most `grace` for in-flight work
    async fn disconnect(&mut self, grace: Duration) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;
}

/// Failure to deliver one message
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("publish to {topic} failed: {reason}")]
pub struct DeliveryError {
    pub topic: String,
    pub reason: String,
}

impl DeliveryError {
    pub fn new(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

/// Per-message result of a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The transport confirmed hand-off of the message
    Acknowledged { topic: String },
    /// Delivery failed
    Failed(DeliveryError),
}

/// Handle on the confirmation of one published message
#[derive(Debug)]
pub struct DeliveryToken {
    topic: String,
    rx: oneshot::Receiver<Result<(), DeliveryError>>,
}

/// Completing side of a [`DeliveryToken`]
#[derive(Debug)]
pub struct DeliveryCompleter {
    topic: String,
    tx: oneshot::Sender<Result<(), DeliveryError>>,
}

impl DeliveryToken {
    /// Create a pending token and the completer that resolves it
    pub fn pending(topic: impl Into<String>) -> (DeliveryCompleter, DeliveryToken) {
        let topic = topic.into();
        let (tx, rx) = oneshot::channel();
        (
            DeliveryCompleter {
                topic: topic.clone(),
                tx,
            },
            DeliveryToken { topic, rx },
        )
    }

    /// Token that is already resolved
    pub fn completed(topic: impl Into<String>, result: Result<(), DeliveryError>) -> Self {
        let (completer, token) = Self::pending(topic);
        completer.complete(result);
        token
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the confirmation
    ///
    /// A completer dropped without resolving counts as a failure.
    pub async fn wait(self) -> Result<(), DeliveryError> {
        let topic = self.topic;
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::new(topic, "delivery token abandoned")),
        }
    }

    /// Wait for the confirmation and report it as an outcome
    pub async fn outcome(self) -> PublishOutcome {
        let topic = self.topic.clone();
        match self.wait().await {
            Ok(()) => PublishOutcome::Acknowledged { topic },
            Err(error) => PublishOutcome::Failed(error),
        }
    }
}

impl DeliveryCompleter {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Resolve the token; a token nobody waits for is ignored
    pub fn complete(self, result: Result<(), DeliveryError>) {
        let _ = self.tx.send(result);
    }

    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    pub fn fail(self, reason: impl Into<String>) {
        let error = DeliveryError::new(self.topic.clone(), reason);
        self.complete(Err(error));
    }
}
