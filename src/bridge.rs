//! One bridge run: fetch, build, publish, confirm, disconnect
//!
//! The bridge owns both collaborators and is generic over them, so the same
//! flow runs against OpenWeatherMap and a broker in production and against
//! the mocks in tests.

use crate::config::{Args, BridgeConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{build_device_messages, TopicMessage};
use crate::transport::mqtt::DISCONNECT_GRACE;
use crate::transport::{DeliveryError, PublishOutcome, Transport};
use crate::weather::{WeatherProvider, WeatherSnapshot};
use crate::{mqtt_span, weather_span};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// What a successful run published
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeReport {
    pub snapshot: WeatherSnapshot,
    /// Topics whose delivery was confirmed, in confirmation order
    pub acknowledged: Vec<String>,
    /// Topics still unconfirmed when the grace period ran out, in publish order
    pub unconfirmed: Vec<String>,
}

impl BridgeReport {
    /// Every published message was confirmed
    pub fn is_complete(&self) -> bool {
        self.unconfirmed.is_empty()
    }
}

/// Weather-to-MQTT bridge with injected collaborators
pub struct WeatherBridge<W, T>
where
    W: WeatherProvider,
    T: Transport + 'static,
{
    config: BridgeConfig,
    weather: W,
    transport: T,
    grace: Duration,
}

impl<W, T> WeatherBridge<W, T>
where
    W: WeatherProvider,
    T: Transport + 'static,
{
    pub fn new(config: BridgeConfig, weather: W, transport: T) -> Self {
        Self {
            config,
            weather,
            transport,
            grace: DISCONNECT_GRACE,
        }
    }

    /// Validate arguments, then build the collaborators from the result
    ///
    /// The factories run only after validation succeeds, so an invalid
    /// configuration never touches the network.
    pub fn from_args<FW, FT>(
        args: Args,
        weather_factory: FW,
        transport_factory: FT,
    ) -> BridgeResult<Self>
    where
        FW: FnOnce(&BridgeConfig) -> BridgeResult<W>,
        FT: FnOnce(&BridgeConfig) -> BridgeResult<T>,
    {
        let config = BridgeConfig::from_args(args)?;

        info!(
            broker = %config.mqtt.broker_url(),
            username = config.mqtt.username.as_deref().unwrap_or(""),
            location = %config.location,
            device = %config.device,
            apikey = %config.masked_api_key(),
            "Resolved configuration"
        );

        let weather = weather_factory(&config)?;
        let transport = transport_factory(&config)?;
        Ok(Self::new(config, weather, transport))
    }

    /// Override how long confirmations and disconnect may take
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run the bridge once
    ///
    /// Any fetch, connect or delivery failure ends the run with an error.
    /// Once connected, an orderly disconnect is attempted on every path.
    pub async fn run(mut self) -> BridgeResult<BridgeReport> {
        let snapshot = self.fetch_weather().await?;
        let messages = build_device_messages(
            &self.config.device,
            &self.config.display_label(),
            &snapshot,
        );

        let span = mqtt_span!(broker = %self.config.mqtt.broker_url());
        self.publish_session(snapshot, messages).instrument(span).await
    }

    /// Connect, publish, disconnect
    async fn publish_session(
        &mut self,
        snapshot: WeatherSnapshot,
        messages: Vec<TopicMessage>,
    ) -> BridgeResult<BridgeReport> {
        self.transport
            .connect()
            .await
            .map_err(BridgeError::connect)?;

        let result = self.publish_all(&messages).await;
        self.disconnect().await;

        let (acknowledged, unconfirmed) = result?;
        Ok(BridgeReport {
            snapshot,
            acknowledged,
            unconfirmed,
        })
    }

    async fn fetch_weather(&self) -> BridgeResult<WeatherSnapshot> {
        let span = weather_span!(
            provider = self.weather.name(),
            location = %self.config.location
        );

        let snapshot = self
            .weather
            .current_by_name(&self.config.location)
            .instrument(span)
            .await?;

        info!(
            "Current weather for {}: {:.1}°C, {}% humidity",
            self.config.location, snapshot.temperature, snapshot.humidity
        );
        Ok(snapshot)
    }

    /// Issue every publish, then collect confirmations until done or the grace deadline
    ///
    /// Each delivery token is awaited on its own task; only this function
    /// decides what an outcome means for the run.
    async fn publish_all(
        &self,
        messages: &[TopicMessage],
    ) -> Result<(Vec<String>, Vec<String>), DeliveryError> {
        let mut confirmations = JoinSet::new();
        let mut issued = Vec::with_capacity(messages.len());

        for message in messages {
            let token = match self.transport.publish(message).await {
                Ok(token) => token,
                Err(e) => {
                    confirmations.abort_all();
                    return Err(DeliveryError::new(message.topic.as_str(), e.to_string()));
                }
            };
            debug!("Published {} = {}", message.topic, message.payload);
            issued.push(token.topic().to_string());
            confirmations.spawn(token.outcome());
        }

        let deadline = Instant::now() + self.grace;
        let mut acknowledged = Vec::with_capacity(issued.len());

        loop {
            match tokio::time::timeout_at(deadline, confirmations.join_next()).await {
                Ok(Some(Ok(PublishOutcome::Acknowledged { topic }))) => {
                    info!("successfully published topic: {}", topic);
                    acknowledged.push(topic);
                }
                Ok(Some(Ok(PublishOutcome::Failed(error)))) => {
                    confirmations.abort_all();
                    return Err(error);
                }
                Ok(Some(Err(join_error))) => {
                    confirmations.abort_all();
                    return Err(DeliveryError::new(
                        "confirmation task",
                        join_error.to_string(),
                    ));
                }
                Ok(None) => break,
                Err(_) => {
                    confirmations.abort_all();
                    break;
                }
            }
        }

        let unconfirmed: Vec<String> = issued
            .into_iter()
            .filter(|topic| !acknowledged.contains(topic))
            .collect();
        if !unconfirmed.is_empty() {
            warn!(
                "{} publishes unconfirmed after {}ms: {}",
                unconfirmed.len(),
                self.grace.as_millis(),
                unconfirmed.join(", ")
            );
        }

        Ok((acknowledged, unconfirmed))
    }

    /// Disconnect failures are logged and otherwise ignored
    async fn disconnect(&mut self) {
        if let Err(e) = self.transport.disconnect(self.grace).await {
            warn!("{}", BridgeError::disconnect(e).to_log_message());
        }
    }
}
