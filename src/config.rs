//! Command-line configuration for the weather bridge
//!
//! All configuration comes from process arguments. Flags are accepted both in
//! the double-dash form clap expects (`--apikey KEY`) and in the single-dash
//! form that scheduled invocations of the tool have always used
//! (`-apikey KEY`, `-port=1884`).

use clap::Parser;
use std::ffi::{OsStr, OsString};
use thiserror::Error;

/// Default MQTT broker port
pub const DEFAULT_PORT: u16 = 1883;

/// Default MQTT broker host
pub const DEFAULT_BROKER: &str = "127.0.0.1";

/// Prefix of the human-readable device name published to `meta/name`
pub const DISPLAY_LABEL_PREFIX: &str = "OpenWeatherMap ";

/// Raw command-line arguments
///
/// String options default to empty so that required-field checks run in a
/// fixed order in [`BridgeConfig::from_args`] instead of inside clap.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "owm2mqtt")]
#[command(about = "Publish OpenWeatherMap current weather to MQTT as Wiren Board device topics")]
#[command(version)]
pub struct Args {
    /// MQTT port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// OpenWeatherMap API key
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub apikey: String,

    /// Location, for example Moscow,RU
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub location: String,

    /// MQTT broker address
    #[arg(long, default_value = DEFAULT_BROKER, allow_hyphen_values = true)]
    pub broker: String,

    /// MQTT broker username
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub username: String,

    /// MQTT broker password
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub password: String,

    /// Device prefix for MQTT topic
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub device: String,
}

impl Args {
    /// Parse arguments from an iterator, accepting single-dash long flags
    pub fn parse_compat<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(normalize_go_style_args(args))
    }

    /// Fallible variant of [`Args::parse_compat`]
    pub fn try_parse_compat<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_go_style_args(args))
    }
}

/// Flags that take a value, in either dash form
const VALUE_FLAGS: [&str; 7] = [
    "port", "apikey", "location", "broker", "username", "password", "device",
];

/// Rewrite `-name` / `-name=value` into `--name` / `--name=value`
///
/// The first element (program name) is passed through. Single-character
/// short flags like `-h`, a bare `-`, and everything after a `--` terminator
/// are left as they are. The argument following a value flag written without
/// `=` is taken verbatim, even when it starts with a dash.
pub fn normalize_go_style_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut terminated = false;
    let mut expects_value = false;

    args.into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(index, arg)| {
            if index == 0 || terminated {
                return arg;
            }
            if std::mem::take(&mut expects_value) {
                return arg;
            }
            if arg == OsStr::new("--") {
                terminated = true;
                return arg;
            }
            let Some(s) = arg.to_str() else {
                return arg;
            };
            expects_value = takes_separate_value(s);
            if is_single_dash_long_flag(s) {
                OsString::from(format!("-{s}"))
            } else {
                arg
            }
        })
        .collect()
}

fn is_single_dash_long_flag(arg: &str) -> bool {
    let Some(rest) = arg.strip_prefix('-') else {
        return false;
    };
    if rest.starts_with('-') {
        return false;
    }
    let name = rest.split('=').next().unwrap_or_default();
    name.len() > 1 && name.starts_with(|c: char| c.is_ascii_alphabetic())
}

/// `-apikey` or `--apikey` with the value in the next argument
fn takes_separate_value(arg: &str) -> bool {
    let name = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-'));
    matches!(name, Some(name) if VALUE_FLAGS.contains(&name))
}

/// MQTT broker connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    /// Username, `None` when no authentication is requested
    pub username: Option<String>,
    /// Password, carried only together with a username (may be empty)
    pub password: Option<String>,
}

impl MqttSettings {
    /// `tcp://host:port` form, used for logging
    pub fn broker_url(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

/// Validated, immutable configuration for one bridge run
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub api_key: String,
    pub location: String,
    pub device: String,
    pub mqtt: MqttSettings,
}

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("OpenWeatherMap API key is empty. Please check for command line options")]
    MissingApiKey,
    #[error("Location is not specified. Please check for command line options")]
    MissingLocation,
    #[error("WirenBoard device not specified. Please check for command line options")]
    MissingDevice,
}

impl BridgeConfig {
    /// Validate raw arguments; checks API key, location and device in that order
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if args.apikey.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if args.location.is_empty() {
            return Err(ConfigError::MissingLocation);
        }
        if args.device.is_empty() {
            return Err(ConfigError::MissingDevice);
        }

        let (username, password) = if args.username.is_empty() {
            (None, None)
        } else {
            (Some(args.username), Some(args.password))
        };

        Ok(Self {
            api_key: args.apikey,
            location: args.location,
            device: args.device,
            mqtt: MqttSettings {
                host: args.broker,
                port: args.port,
                username,
                password,
            },
        })
    }

    /// Human-readable device name, e.g. `OpenWeatherMap Moscow,RU`
    pub fn display_label(&self) -> String {
        format!("{DISPLAY_LABEL_PREFIX}{}", self.location)
    }

    /// API key with everything but the last four characters masked
    pub fn masked_api_key(&self) -> String {
        mask_secret(&self.api_key)
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{visible}", "*".repeat(chars.len() - 4))
}
