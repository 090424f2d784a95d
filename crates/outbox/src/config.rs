//! Outbox tuning knobs loaded from environment variables.

use std::time::Duration;

/// Relay configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `OUTBOX_BATCH_SIZE` — records per relay tick (default: `50`)
/// - `OUTBOX_POLL_INTERVAL_MS` — delay after a tick completes (default: `1000`)
/// - `OUTBOX_MAX_RETRIES` — publish attempts before a record is exhausted (default: `5`)
/// - `OUTBOX_BACKOFF_BASE_SECS` — base of the exponential retry backoff (default: `5`)
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub max_retries: i32,
    pub backoff_base: Duration,
}

impl OutboxConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse("OUTBOX_BATCH_SIZE").unwrap_or(defaults.batch_size),
            poll_interval: env_parse("OUTBOX_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_retries: env_parse("OUTBOX_MAX_RETRIES").unwrap_or(defaults.max_retries),
            backoff_base: env_parse("OUTBOX_BACKOFF_BASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_base),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_secs(1),
            max_retries: 5,
            backoff_base: Duration::from_secs(5),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = OutboxConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_base, Duration::from_secs(5));
    }
}
