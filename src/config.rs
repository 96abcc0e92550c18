// src/config.rs
use std::time::Duration;

/// Runtime configuration, read from the environment with sensible local
/// defaults so the headless binary starts without any setup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Base delay before the first reconnect attempt.
    pub reconnect_delay: Duration,
    /// Ceiling for the doubling reconnect backoff.
    pub max_reconnect_delay: Duration,
    /// Interval of the nearby-drivers poll while idle on the map.
    pub nearby_poll_interval: Duration,
    /// How long after the local ETA countdown reaches zero we wait for the
    /// server's `ride:completed` before force-resetting the ride.
    pub completion_grace: Duration,
    pub default_payment_method: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:4000".to_string(),
            ws_url: "ws://localhost:4000/realtime".to_string(),
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            nearby_poll_interval: Duration::from_secs(10),
            completion_grace: Duration::from_secs(120),
            default_payment_method: "cash".to_string(),
        }
    }
}

impl AppConfig {
    /// Build a config from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: std::env::var("KEKE_API_BASE_URL")
                .unwrap_or(defaults.api_base_url),
            ws_url: std::env::var("KEKE_WS_URL").unwrap_or(defaults.ws_url),
            request_timeout: env_secs("KEKE_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            connect_timeout: env_secs("KEKE_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            reconnect_delay: env_secs("KEKE_RECONNECT_DELAY_SECS", defaults.reconnect_delay),
            max_reconnect_delay: env_secs(
                "KEKE_MAX_RECONNECT_DELAY_SECS",
                defaults.max_reconnect_delay,
            ),
            nearby_poll_interval: env_secs(
                "KEKE_NEARBY_POLL_SECS",
                defaults.nearby_poll_interval,
            ),
            completion_grace: env_secs("KEKE_COMPLETION_GRACE_SECS", defaults.completion_grace),
            default_payment_method: std::env::var("KEKE_PAYMENT_METHOD")
                .unwrap_or(defaults.default_payment_method),
        }
    }
}

fn env_secs(key: &str, fallback: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_bounded() {
        let config = AppConfig::default();
        assert!(config.reconnect_delay <= config.max_reconnect_delay);
        assert!(config.completion_grace >= Duration::from_secs(60));
    }
}
