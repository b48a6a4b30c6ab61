//! Relay Configuration Settings
//!
//! Configuration types for the card relay, loaded from environment variables.

use std::time::Duration;

use crate::domain::topic::reserved_char;

/// Team identifier used when `TEAM_ID` is unset.
pub const DEFAULT_TEAM_ID: &str = "team^_^TopDog";

/// Broker address used when `MQTT_BROKER` is unset.
pub const DEFAULT_BROKER_URL: &str = "mqtt://broker.benax.rw:1883";

const DEFAULT_MQTT_PORT: u16 = 1883;
const MIN_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MIN_PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RECONNECT_MULTIPLIER: f64 = 10.0;
const MAX_RECONNECT_JITTER: f64 = 0.5;

/// MQTT broker connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Broker host name or address.
    pub host: String,
    /// Broker TCP port.
    pub port: u16,
    /// Prefix for the generated client identity.
    pub client_id_prefix: String,
    /// MQTT keep-alive interval.
    pub keep_alive: Duration,
    /// Delay before the first reconnection attempt.
    pub reconnect_delay: Duration,
    /// Ceiling for the reconnect delay when it grows.
    pub reconnect_max_delay: Duration,
    /// Growth of the reconnect delay per attempt (1.0 keeps it fixed).
    pub reconnect_multiplier: f64,
    /// Random spread applied to each reconnect delay, as a fraction.
    pub reconnect_jitter: f64,
    /// Bound on a single command publish.
    pub publish_timeout: Duration,
    /// Capacity of the request queue toward the event loop.
    pub request_capacity: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "broker.benax.rw".to_string(),
            port: DEFAULT_MQTT_PORT,
            client_id_prefix: "backend".to_string(),
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            reconnect_max_delay: Duration::from_secs(5),
            reconnect_multiplier: 1.0,
            reconnect_jitter: 0.0,
            publish_timeout: Duration::from_secs(5),
            request_capacity: 64,
        }
    }
}

impl BrokerSettings {
    /// Build a client identity unique to this process.
    #[must_use]
    pub fn client_id(&self, team_id: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{team_id}_{}", self.client_id_prefix, &suffix[..8])
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Port for the HTTP API and live-update channel.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 9218 }
    }
}

/// Live-update channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSettings {
    /// Outbound frame buffer per subscriber.
    pub sink_capacity: usize,
    /// Server ping cadence.
    pub ping_interval: Duration,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            sink_capacity: 256,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Tenant identifier scoping every topic.
    pub team_id: String,
    /// Broker settings.
    pub broker: BrokerSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Live-update settings.
    pub live: LiveSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            team_id: DEFAULT_TEAM_ID.to_string(),
            broker: BrokerSettings::default(),
            server: ServerSettings::default(),
            live: LiveSettings::default(),
        }
    }
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `TEAM_ID` is empty or contains an MQTT wildcard
    /// or level separator, or if `MQTT_BROKER` is not a valid broker address.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let team_id = lookup("TEAM_ID").unwrap_or_else(|| DEFAULT_TEAM_ID.to_string());
        if team_id.trim().is_empty() {
            return Err(ConfigError::EmptyValue("TEAM_ID".to_string()));
        }
        if let Some(c) = reserved_char(&team_id) {
            return Err(ConfigError::InvalidTeamId(team_id, c));
        }

        let broker_url = lookup("MQTT_BROKER").unwrap_or_else(|| DEFAULT_BROKER_URL.to_string());
        let (host, port) = parse_broker_url(&broker_url)?;

        let defaults = BrokerSettings::default();
        let reconnect_delay = parse_env_duration_millis(
            &lookup,
            "MQTT_RECONNECT_DELAY_MS",
            defaults.reconnect_delay,
        )
        .max(MIN_RECONNECT_DELAY);
        let broker = BrokerSettings {
            host,
            port,
            client_id_prefix: lookup("MQTT_CLIENT_ID_PREFIX")
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.client_id_prefix),
            keep_alive: parse_env_duration_secs(&lookup, "MQTT_KEEP_ALIVE_SECS", defaults.keep_alive),
            reconnect_delay,
            reconnect_max_delay: parse_env_duration_millis(
                &lookup,
                "MQTT_RECONNECT_MAX_DELAY_MS",
                reconnect_delay,
            )
            .max(reconnect_delay),
            reconnect_multiplier: parse_env_factor(
                &lookup,
                "MQTT_RECONNECT_MULTIPLIER",
                defaults.reconnect_multiplier,
            )
            .clamp(1.0, MAX_RECONNECT_MULTIPLIER),
            reconnect_jitter: parse_env_factor(
                &lookup,
                "MQTT_RECONNECT_JITTER",
                defaults.reconnect_jitter,
            )
            .clamp(0.0, MAX_RECONNECT_JITTER),
            publish_timeout: parse_env_duration_secs(
                &lookup,
                "MQTT_PUBLISH_TIMEOUT_SECS",
                defaults.publish_timeout,
            )
            .clamp(MIN_PUBLISH_TIMEOUT, MAX_PUBLISH_TIMEOUT),
            request_capacity: parse_env(&lookup, "MQTT_REQUEST_CAPACITY", defaults.request_capacity)
                .max(1),
        };

        let server = ServerSettings {
            http_port: lookup("RELAY_HTTP_PORT")
                .or_else(|| lookup("PORT"))
                .and_then(|v| v.parse().ok())
                .unwrap_or(ServerSettings::default().http_port),
        };

        let live_defaults = LiveSettings::default();
        let live = LiveSettings {
            sink_capacity: parse_env(&lookup, "RELAY_SINK_CAPACITY", live_defaults.sink_capacity)
                .max(1),
            ping_interval: parse_env_duration_secs(
                &lookup,
                "RELAY_PING_INTERVAL_SECS",
                live_defaults.ping_interval,
            )
            .max(Duration::from_secs(1)),
        };

        Ok(Self {
            team_id,
            broker,
            server,
            live,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Team identifier cannot be used as a literal topic level.
    #[error("invalid TEAM_ID '{0}': character {1:?} is reserved in topic names")]
    InvalidTeamId(String, char),
    /// Broker address could not be parsed.
    #[error("invalid broker address '{0}': expected mqtt://host[:port] or tcp://host[:port]")]
    InvalidBrokerUrl(String),
}

/// Split a broker address into host and port.
///
/// Accepts `mqtt://` and `tcp://` schemes, or a bare `host[:port]`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidBrokerUrl` for other schemes, an empty host,
/// or a non-numeric port.
pub fn parse_broker_url(url: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidBrokerUrl(url.to_string());
    let trimmed = url.trim();

    let rest = match trimmed.split_once("://") {
        Some(("mqtt" | "tcp", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => trimmed,
    };
    let authority = rest.trim_end_matches('/');

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (authority, DEFAULT_MQTT_PORT),
    };

    if host.is_empty() || host.contains('/') {
        return Err(invalid());
    }

    Ok((host.to_string(), port))
}

fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_factor<F>(lookup: &F, key: &str, default: f64) -> f64
where
    F: Fn(&str) -> Option<String>,
{
    let value: f64 = parse_env(lookup, key, default);
    if value.is_finite() { value } else { default }
}

fn parse_env_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
