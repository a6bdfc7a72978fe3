//! owm2mqtt - Main Entry Point
//!
//! Accepts both `--flag value` and the single-dash `-flag value` form used
//! by existing timer units.

use owm2mqtt::config::{Args, BridgeConfig};
use owm2mqtt::observability::init_default_logging;
use owm2mqtt::transport::mqtt::{ConnectionHandlers, MqttClient};
use owm2mqtt::weather::{OpenWeatherMapConfig, OpenWeatherMapProvider};
use owm2mqtt::{BridgeError, BridgeResult, WeatherBridge};
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse_compat(std::env::args_os());

    init_default_logging();

    info!("Starting owm2mqtt v{}", env!("CARGO_PKG_VERSION"));

    let bridge = match WeatherBridge::from_args(args, build_weather_provider, build_transport) {
        Ok(bridge) => bridge,
        Err(e) => exit_with(e),
    };

    match bridge.run().await {
        Ok(report) => {
            info!(
                "Published {} topics for {} ({} unconfirmed)",
                report.acknowledged.len() + report.unconfirmed.len(),
                report.snapshot.location,
                report.unconfirmed.len()
            );
        }
        Err(e) => exit_with(e),
    }
}

fn build_weather_provider(config: &BridgeConfig) -> BridgeResult<OpenWeatherMapProvider> {
    let provider = OpenWeatherMapProvider::new(OpenWeatherMapConfig::new(config.api_key.as_str()))?;
    Ok(provider)
}

fn build_transport(config: &BridgeConfig) -> BridgeResult<MqttClient> {
    MqttClient::new(config.mqtt.clone(), ConnectionHandlers::default())
        .map_err(BridgeError::connect)
}

fn exit_with(error: BridgeError) -> ! {
    error!("{}", error.to_log_message());
    process::exit(error.exit_code());
}
