//! Saga tuning knobs loaded from environment variables.

use std::time::Duration;

/// Orchestrator configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SAGA_TIMEOUT_MS` — per-saga wall-clock timeout (default: `300000`)
/// - `SAGA_STATE_TTL_SECS` — state store TTL, must outlive the timeout
///   (default: `2100`, i.e. 30 min timeout + 5 min grace)
/// - `SAGA_TERMINAL_GRACE_SECS` — how long terminal state stays visible
///   for debugging before deletion (default: `300`)
#[derive(Debug, Clone)]
pub struct SagaConfig {
    pub timeout: Duration,
    pub state_ttl: Duration,
    pub terminal_grace: Duration,
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: env_parse("SAGA_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            state_ttl: env_parse("SAGA_STATE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.state_ttl),
            terminal_grace: env_parse("SAGA_TERMINAL_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.terminal_grace),
        }
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(300_000),
            state_ttl: Duration::from_secs(35 * 60),
            terminal_grace: Duration::from_secs(5 * 60),
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
        let config = SagaConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.state_ttl, Duration::from_secs(2100));
        assert_eq!(config.terminal_grace, Duration::from_secs(300));
    }

    #[test]
    fn state_ttl_outlives_timeout() {
        let config = SagaConfig::default();
        assert!(config.state_ttl > config.timeout);
    }
}
