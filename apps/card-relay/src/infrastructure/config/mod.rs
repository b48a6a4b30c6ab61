//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    BrokerSettings, ConfigError, DEFAULT_BROKER_URL, DEFAULT_TEAM_ID, LiveSettings, RelayConfig,
    ServerSettings, parse_broker_url,
};
