//! Weather service clients
//!
//! [`provider`] defines the trait the bridge fetches current conditions
//! through; [`openweathermap`] is the production implementation.

pub mod openweathermap;
pub mod provider;

pub use openweathermap::{OpenWeatherMapConfig, OpenWeatherMapProvider};
pub use provider::{WeatherError, WeatherProvider, WeatherSnapshot};
