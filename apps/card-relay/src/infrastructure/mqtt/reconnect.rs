//! Reconnection Policy
//!
//! Delay schedule between broker connection attempts. The default is a fixed
//! delay; a multiplier and jitter can be layered on top. Attempts never run
//! out, and no delay is ever shorter than one second.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::BrokerSettings;

/// Shortest delay the policy will ever return.
pub const MIN_DELAY: Duration = Duration::from_secs(1);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Growth per attempt (1.0 keeps the delay fixed).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl ReconnectConfig {
    /// Fixed delay, no growth or jitter.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Schedule configured by `MQTT_RECONNECT_*`.
    #[must_use]
    pub const fn from_broker_settings(settings: &BrokerSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay,
            max_delay: settings.reconnect_max_delay,
            multiplier: settings.reconnect_multiplier,
            jitter_factor: settings.reconnect_jitter,
        }
    }
}

/// Reconnection policy with optional backoff and jitter.
///
/// # Example
///
/// ```rust
/// use card_relay::infrastructure::mqtt::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_secs(5)));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay.max(MIN_DELAY);
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Get the delay before the next attempt and advance the schedule.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);

        let delay = self.apply_jitter(self.current_delay).max(MIN_DELAY);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let max_millis = self.config.max_delay.max(MIN_DELAY).as_millis();
        let capped = u64::try_from(next_millis.min(max_millis)).unwrap_or(u64::MAX);
        self.current_delay = Duration::from_millis(capped).max(MIN_DELAY);

        delay
    }

    /// Reset the policy after a successful connection.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay.max(MIN_DELAY);
        self.attempt_count = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fixed_five_seconds() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        for _ in 0..10 {
            assert_eq!(policy.next_delay(), Duration::from_secs(5));
        }
        assert_eq!(policy.attempt_count(), 10);
    }

    #[test]
    fn delay_never_below_floor() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_millis(10)));
        assert_eq!(policy.next_delay(), MIN_DELAY);
    }

    #[test]
    fn backoff_grows_to_cap() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
            jitter_factor: 0.0,
        });

        assert_eq!(policy.next_delay(), Duration::from_secs(1));
        assert_eq!(policy.next_delay(), Duration::from_secs(2));
        assert_eq!(policy.next_delay(), Duration::from_secs(4));
        assert_eq!(policy.next_delay(), Duration::from_secs(4));
    }

    #[test]
    fn reset_restarts_schedule() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 3.0,
            jitter_factor: 0.0,
        });
        let _ = policy.next_delay();
        let _ = policy.next_delay();

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                jitter_factor: 0.1,
                ..ReconnectConfig::fixed(Duration::from_secs(5))
            });

            let millis = policy.next_delay().as_millis();
            assert!((4500..=5500).contains(&millis), "delay {millis}ms out of range");
        }
    }

    #[test]
    fn follows_broker_settings() {
        let settings = BrokerSettings {
            reconnect_delay: Duration::from_millis(2500),
            ..BrokerSettings::default()
        };
        let mut policy = ReconnectPolicy::new(ReconnectConfig::from_broker_settings(&settings));
        assert_eq!(policy.next_delay(), Duration::from_millis(2500));
        assert_eq!(policy.next_delay(), Duration::from_millis(2500));
    }

    #[test]
    fn broker_settings_enable_backoff() {
        let settings = BrokerSettings {
            reconnect_delay: Duration::from_secs(2),
            reconnect_max_delay: Duration::from_secs(5),
            reconnect_multiplier: 2.0,
            ..BrokerSettings::default()
        };
        let mut policy = ReconnectPolicy::new(ReconnectConfig::from_broker_settings(&settings));
        assert_eq!(policy.next_delay(), Duration::from_secs(2));
        assert_eq!(policy.next_delay(), Duration::from_secs(4));
        assert_eq!(policy.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn broker_settings_enable_jitter() {
        let settings = BrokerSettings {
            reconnect_delay: Duration::from_secs(4),
            reconnect_max_delay: Duration::from_secs(4),
            reconnect_jitter: 0.25,
            ..BrokerSettings::default()
        };
        for _ in 0..50 {
            let mut policy =
                ReconnectPolicy::new(ReconnectConfig::from_broker_settings(&settings));
            let millis = policy.next_delay().as_millis();
            assert!((3000..=5000).contains(&millis), "delay {millis}ms out of range");
        }
    }
}
