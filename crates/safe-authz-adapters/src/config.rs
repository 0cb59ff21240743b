use std::time::Duration;

use safe_authz_core::{CoordinatorConfig, PortError};

const ENV_PREFIX: &str = "SAFE_AUTHZ_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
    pub push_service_url: String,
    pub relay_service_url: String,
    pub rpc_url: String,
    pub http_timeout_ms: u64,
    pub confirmation_cooldown_ms: u64,
    pub status_retry_delay_ms: u64,
    pub chain_id: u64,
    /// Reported to the push service and to bridge peers.
    pub client_name: String,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            push_service_url: "https://safe-notification.gnosis.io/api/v1".to_owned(),
            relay_service_url: "https://safe-relay.gnosis.io/api/v1".to_owned(),
            rpc_url: "http://127.0.0.1:8545".to_owned(),
            http_timeout_ms: 15_000,
            confirmation_cooldown_ms: 30_000,
            status_retry_delay_ms: 20_000,
            chain_id: 1,
            client_name: "safe-authz".to_owned(),
        }
    }
}

impl AuthzConfig {
    /// Defaults overridden by `SAFE_AUTHZ_*` variables that are set.
    pub fn from_env() -> Result<Self, PortError> {
        let defaults = Self::default();
        Ok(Self {
            push_service_url: env_string("PUSH_SERVICE_URL", defaults.push_service_url),
            relay_service_url: env_string("RELAY_SERVICE_URL", defaults.relay_service_url),
            rpc_url: env_string("RPC_URL", defaults.rpc_url),
            http_timeout_ms: env_u64("HTTP_TIMEOUT_MS", defaults.http_timeout_ms)?,
            confirmation_cooldown_ms: env_u64(
                "CONFIRMATION_COOLDOWN_MS",
                defaults.confirmation_cooldown_ms,
            )?,
            status_retry_delay_ms: env_u64("STATUS_RETRY_DELAY_MS", defaults.status_retry_delay_ms)?,
            chain_id: env_u64("CHAIN_ID", defaults.chain_id)?,
            client_name: env_string("CLIENT_NAME", defaults.client_name),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            confirmation_cooldown: Duration::from_millis(self.confirmation_cooldown_ms),
            status_retry_delay: Duration::from_millis(self.status_retry_delay_ms),
            scheme: None,
        }
    }

    pub fn http_client(&self) -> Result<reqwest::Client, PortError> {
        reqwest::Client::builder()
            .timeout(self.http_timeout())
            .build()
            .map_err(|e| PortError::Transport(format!("http client init failed: {e}")))
    }
}

fn env_string(name: &str, default: String) -> String {
    std::env::var(format!("{ENV_PREFIX}{name}")).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> Result<u64, PortError> {
    match std::env::var(format!("{ENV_PREFIX}{name}")) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PortError::Validation(format!("{ENV_PREFIX}{name}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_config_uses_configured_delays() {
        let config = AuthzConfig {
            confirmation_cooldown_ms: 1_500,
            status_retry_delay_ms: 250,
            ..AuthzConfig::default()
        };
        let coordinator = config.coordinator();
        assert_eq!(coordinator.confirmation_cooldown, Duration::from_millis(1_500));
        assert_eq!(coordinator.status_retry_delay, Duration::from_millis(250));
        assert!(coordinator.scheme.is_none());
    }

    #[test]
    fn defaults_match_protocol_timings() {
        let config = AuthzConfig::default();
        assert_eq!(config.coordinator().confirmation_cooldown, Duration::from_secs(30));
        assert_eq!(config.coordinator().status_retry_delay, Duration::from_secs(20));
        assert_eq!(config.http_timeout(), Duration::from_secs(15));
    }
}
