use std::time::Duration;

use anyhow::{Context, Result};

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub endpoint_url: String,
    pub instance_id: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            endpoint_url: std::env::var("CONDUIT_ENDPOINT_URL")
                .context("CONDUIT_ENDPOINT_URL must be set")?,
            instance_id: std::env::var("CONDUIT_INSTANCE_ID")
                .context("CONDUIT_INSTANCE_ID must be set")?,
            request_timeout: Duration::from_secs(env_or("CONDUIT_REQUEST_TIMEOUT_SECS", 30)?),
            connect_timeout: Duration::from_secs(env_or("CONDUIT_CONNECT_TIMEOUT_SECS", 10)?),
        };

        config.log_summary();
        Ok(config)
    }

    fn log_summary(&self) {
        tracing::info!("Runtime config loaded:");
        tracing::info!("  CONDUIT_ENDPOINT_URL: {}", self.endpoint_url);
        tracing::info!("  CONDUIT_INSTANCE_ID: {}", self.instance_id);
        tracing::info!(
            "  timeouts: request {}s, connect {}s",
            self.request_timeout.as_secs(),
            self.connect_timeout.as_secs()
        );
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
pub fn env_or(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
