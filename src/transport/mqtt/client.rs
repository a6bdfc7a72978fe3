//! Impure I/O operations for MQTT client
//!
//! This module handles all impure I/O operations including network communication,
//! async coordination, and integration with the rumqttc client.

use super::connection::{
    configure_mqtt_options, ConnectionState, MqttError, CLIENT_ID, CONNECT_TIMEOUT, PUBLISH_QOS,
    REQUEST_CHANNEL_CAPACITY,
};
use super::handlers::ConnectionHandlers;
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::MqttSettings;
use crate::protocol::TopicMessage;
use crate::transport::{DeliveryCompleter, DeliveryToken, Transport};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// MQTT transport client publishing device state to one broker
pub struct MqttClient {
    settings: MqttSettings,
    client: Arc<Mutex<AsyncClient>>,
    event_loop: Option<Arc<Mutex<EventLoop>>>,
    handlers: ConnectionHandlers,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    in_flight: Arc<InFlight>,
}

/// Publishes handed to the event loop but not yet written to the socket
///
/// QoS 0 publishes carry no packet id, so confirmations are matched in
/// request order: the event loop processes requests strictly FIFO.
#[derive(Default)]
struct InFlight {
    queue: std::sync::Mutex<VecDeque<DeliveryCompleter>>,
    drained: Notify,
}

impl InFlight {
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<DeliveryCompleter>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, completer: DeliveryCompleter) {
        self.lock().push_back(completer);
    }

    /// Take back the most recent entry after its request was never sent
    fn pop_back(&self) -> Option<DeliveryCompleter> {
        let completer = self.lock().pop_back();
        self.notify_if_empty();
        completer
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Confirm the oldest outstanding publish
    fn complete_oldest(&self) {
        let completer = self.lock().pop_front();
        match completer {
            Some(completer) => {
                debug!(target: "mqtt_transport", "Publish written: {}", completer.topic());
                completer.succeed();
            }
            None => debug!(target: "mqtt_transport", "Publish written with nothing in flight"),
        }
        self.notify_if_empty();
    }

    /// Fail everything outstanding with one reason
    fn fail_all(&self, reason: &str) {
        let pending: Vec<DeliveryCompleter> = self.lock().drain(..).collect();
        for completer in pending {
            completer.fail(reason);
        }
        self.drained.notify_waiters();
    }

    fn notify_if_empty(&self) {
        if self.is_empty() {
            self.drained.notify_waiters();
        }
    }

    /// Wait until nothing is in flight; false if the deadline passed first
    async fn wait_drained(&self, deadline: Instant) -> bool {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_empty();
            }
        }
    }
}

impl MqttClient {
    pub fn new(settings: MqttSettings, handlers: ConnectionHandlers) -> Result<Self, MqttError> {
        let (client, event_loop) = Self::create_connection(&settings)?;

        Ok(MqttClient {
            settings,
            client: Arc::new(Mutex::new(client)),
            event_loop: Some(Arc::new(Mutex::new(event_loop))),
            handlers,
            event_loop_handle: None,
            state_rx: None,
            state_tx: None,
            shutdown_tx: None,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Helper method to create the client handle and its event loop
    fn create_connection(settings: &MqttSettings) -> Result<(AsyncClient, EventLoop), MqttError> {
        let mqtt_options = configure_mqtt_options(settings, CLIENT_ID)?;
        Ok(AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY))
    }

    /// Create connection state and shutdown channels
    /// Pure function for channel setup - easily testable
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
                match *state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::Connecting => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Connect to the broker
    ///
    /// Only returns success once the broker acknowledged the session. A lost
    /// connection is not re-established.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self.event_loop.take().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Event loop already started".to_string())
        })?;

        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.state_tx = Some(state_tx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        info!("Connecting to MQTT broker {}", self.settings.broker_url());

        let handle = tokio::spawn(Self::run_event_loop(
            event_loop,
            state_tx,
            shutdown_rx,
            self.in_flight.clone(),
            self.handlers.clone(),
        ));
        self.event_loop_handle = Some(handle);

        if let Err(e) = Self::wait_for_connection_confirmation(state_rx, CONNECT_TIMEOUT).await {
            self.stop_event_loop();
            return Err(e);
        }

        Ok(())
    }

    /// Drive the rumqttc event loop until disconnect, error or shutdown
    async fn run_event_loop(
        event_loop: Arc<Mutex<EventLoop>>,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        in_flight: Arc<InFlight>,
        handlers: ConnectionHandlers,
    ) {
        debug!(target: "mqtt_transport", "Starting MQTT event loop");
        let mut event_loop = event_loop.lock().await;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(target: "mqtt_transport", "Shutdown signal received");
                        break;
                    }
                }

                event_result = event_loop.poll() => {
                    match event_result {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            if !Self::process_event_route(route, &state_tx, &in_flight, &handlers) {
                                break;
                            }
                        }
                        Err(e) => {
                            Self::handle_event_loop_error(&e, &state_tx, &in_flight, &handlers);
                            break;
                        }
                    }
                }
            }
        }

        debug!(target: "mqtt_transport", "MQTT event loop stopped");
    }

    /// Process routed MQTT event - extracted for testability
    /// Returns true to continue loop, false to break
    fn process_event_route(
        route: EventRoute,
        state_tx: &watch::Sender<ConnectionState>,
        in_flight: &InFlight,
        handlers: &ConnectionHandlers,
    ) -> bool {
        let keep_polling = MessageHandler::continues_after(&route);

        match route {
            EventRoute::ConnectionAcknowledged => {
                let _ = state_tx.send(ConnectionState::Connected);
                (handlers.on_connect)();
            }
            route @ EventRoute::MessageReceived { .. } => {
                if let Some(message) = route.into_inbound_message() {
                    (handlers.on_message)(&message);
                }
            }
            EventRoute::PublishWritten => in_flight.complete_oldest(),
            EventRoute::Disconnected => {
                let reason = "Disconnected by broker";
                let _ = state_tx.send(ConnectionState::Disconnected(reason.to_string()));
                in_flight.fail_all(reason);
                (handlers.on_connection_lost)(reason);
            }
            EventRoute::DisconnectWritten => {
                debug!(target: "mqtt_transport", "Disconnect sent");
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
            }
            EventRoute::OutgoingEvent => {}
        }

        keep_polling
    }

    /// Handle event loop error - extracted for testability
    fn handle_event_loop_error(
        error: &rumqttc::ConnectionError,
        state_tx: &watch::Sender<ConnectionState>,
        in_flight: &InFlight,
        handlers: &ConnectionHandlers,
    ) {
        let was_connected = state_tx.borrow().can_publish();
        let reason = error.to_string();

        let _ = state_tx.send(ConnectionState::Disconnected(reason.clone()));
        in_flight.fail_all(&reason);

        if was_connected {
            (handlers.on_connection_lost)(&reason);
        } else {
            error!("MQTT connection failed: {}", reason);
        }
    }

    /// Signal shutdown and abort the event loop task
    fn stop_event_loop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }

    /// Orderly disconnect
    ///
    /// Waits up to `grace` for outstanding publishes to be written, sends
    /// DISCONNECT and gives the event loop the same bound to finish.
    /// Anything still outstanding afterwards is failed. Disconnecting a
    /// client that never connected is a no-op.
    pub async fn disconnect(&mut self, grace: Duration) -> Result<(), MqttError> {
        let Some(mut handle) = self.event_loop_handle.take() else {
            debug!(target: "mqtt_transport", "Disconnect without active connection");
            return Ok(());
        };

        if !self.in_flight.wait_drained(Instant::now() + grace).await {
            warn!(
                "{} publishes still in flight after {}ms grace",
                self.in_flight.len(),
                grace.as_millis()
            );
        }

        let send_result = if self.is_connected() {
            let client = self.client.lock().await;
            client
                .disconnect()
                .await
                .map_err(|e| MqttError::DisconnectFailed(Box::new(e)))
        } else {
            Ok(())
        };

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => debug!(target: "mqtt_transport", "Event loop task shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("Event loop task ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Event loop task didn't shut down gracefully, forcing abort");
                if let Some(shutdown_tx) = &self.shutdown_tx {
                    let _ = shutdown_tx.send(true);
                }
                handle.abort();
            }
        }

        self.in_flight
            .fail_all("connection closed before delivery was confirmed");

        if let Some(state_tx) = &self.state_tx {
            let _ = state_tx.send(ConnectionState::Disconnected(
                "Client disconnected".to_string(),
            ));
        }

        info!("MQTT client disconnected");
        send_result
    }

    /// Get current connection state
    /// Returns None if connection hasn't been established yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Check connection state before operations
    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Client not connected".to_string())
        })?;

        let current_state = state_rx.borrow().clone();
        if !current_state.can_publish() {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        Ok(())
    }

    /// Queue one message and return its delivery token
    pub async fn publish(&self, message: &TopicMessage) -> Result<DeliveryToken, MqttError> {
        self.check_connection_state()?;

        // Holding the client lock keeps the in-flight queue in request order
        let client = self.client.lock().await;
        let (completer, token) = DeliveryToken::pending(message.topic.as_str());
        self.in_flight.push(completer);

        if let Err(e) = client
            .publish(
                message.topic.as_str(),
                PUBLISH_QOS,
                message.retain,
                message.payload.as_bytes().to_vec(),
            )
            .await
        {
            self.in_flight.pop_back();
            return Err(MqttError::PublishFailed(Box::new(e)));
        }

        debug!(
            target: "mqtt_transport",
            "Queued publish: {} (retain={})",
            message.topic,
            message.retain
        );
        Ok(token)
    }
}

/// Implementation of Transport trait for MqttClient
#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn publish(&self, message: &TopicMessage) -> Result<DeliveryToken, Self::Error> {
        MqttClient::publish(self, message).await
    }

    async fn disconnect(&mut self, grace: Duration) -> Result<(), Self::Error> {
        MqttClient::disconnect(self, grace).await
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // No async work is possible here; disconnect() is the orderly path
        self.stop_event_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{DeliveryError, PublishOutcome};

    fn test_settings(port: u16) -> MqttSettings {
        MqttSettings {
            host: "127.0.0.1".to_string(),
            port,
            username: None,
            password: None,
        }
    }

    fn assert_transport<T: Transport + Send + Sync + 'static>() {}

    #[test]
    fn test_mqtt_client_is_a_shareable_transport() {
        assert_transport::<MqttClient>();
    }

    #[test]
    fn test_setup_connection_channels() {
        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            MqttClient::setup_connection_channels();

        assert_eq!(*state_rx.borrow(), ConnectionState::Connecting);
        assert!(!(*shutdown_rx.borrow()));

        state_tx.send(ConnectionState::Connected).unwrap();
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);

        shutdown_tx.send(true).unwrap();
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_success() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Connected);
        });

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(500))
                .await;
        assert!(result.is_ok(), "Should successfully wait for connection");
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_timeout() {
        // Keep the sender alive so only the timeout can end the wait
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(10)).await;
        drop(state_tx);

        let err_msg = result.unwrap_err().to_string();
        assert!(
            err_msg.contains("ConnAck"),
            "Error should mention ConnAck, got: {err_msg}"
        );
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_disconnected() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Disconnected("Test disconnect".to_string()));
        });

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(500))
                .await;
        assert!(result.unwrap_err().to_string().contains("Test disconnect"));
    }

    #[tokio::test]
    async fn test_in_flight_completes_in_request_order() {
        let in_flight = InFlight::default();
        let (first_completer, first) = DeliveryToken::pending("a");
        let (second_completer, second) = DeliveryToken::pending("b");
        in_flight.push(first_completer);
        in_flight.push(second_completer);

        in_flight.complete_oldest();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(
            first.outcome().await,
            PublishOutcome::Acknowledged {
                topic: "a".to_string()
            }
        );

        in_flight.fail_all("connection reset");
        assert!(in_flight.is_empty());
        assert!(matches!(
            second.outcome().await,
            PublishOutcome::Failed(DeliveryError { ref topic, .. }) if topic == "b"
        ));
    }

    #[tokio::test]
    async fn test_wait_drained() {
        let in_flight = Arc::new(InFlight::default());
        assert!(in_flight.wait_drained(Instant::now()).await);

        let (completer, _token) = DeliveryToken::pending("a");
        in_flight.push(completer);
        assert!(
            !in_flight
                .wait_drained(Instant::now() + Duration::from_millis(20))
                .await
        );

        let writer = in_flight.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.complete_oldest();
        });
        assert!(
            in_flight
                .wait_drained(Instant::now() + Duration::from_secs(2))
                .await
        );
    }

    #[test]
    fn test_process_event_route_updates_state() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();
        let in_flight = InFlight::default();
        let handlers = ConnectionHandlers::default();

        assert!(MqttClient::process_event_route(
            EventRoute::ConnectionAcknowledged,
            &state_tx,
            &in_flight,
            &handlers
        ));
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);

        assert!(!MqttClient::process_event_route(
            EventRoute::Disconnected,
            &state_tx,
            &in_flight,
            &handlers
        ));
        assert!(matches!(
            *state_rx.borrow(),
            ConnectionState::Disconnected(_)
        ));
    }

    #[tokio::test]
    async fn test_connection_state_before_connect() {
        let client = MqttClient::new(test_settings(1883), ConnectionHandlers::default()).unwrap();
        assert!(client.connection_state().is_none());
        assert!(!Transport::is_connected(&client));
    }

    #[tokio::test]
    async fn test_publish_fails_without_connection() {
        let client = MqttClient::new(test_settings(1883), ConnectionHandlers::default()).unwrap();
        let message = TopicMessage::retained("devices/wb1/meta/name", "label");

        assert!(client.publish(&message).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let mut client =
            MqttClient::new(test_settings(1883), ConnectionHandlers::default()).unwrap();
        assert!(client.disconnect(Duration::from_millis(250)).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client =
            MqttClient::new(test_settings(port), ConnectionHandlers::default()).unwrap();
        let result = client.connect().await;

        assert!(matches!(result, Err(MqttError::ConnectionFailedStr(_))));
        assert!(matches!(
            client.connection_state(),
            Some(ConnectionState::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client =
            MqttClient::new(test_settings(port), ConnectionHandlers::default()).unwrap();
        let _ = client.connect().await;

        let second = client.connect().await.unwrap_err();
        assert!(second.to_string().contains("already started"));
    }
}
