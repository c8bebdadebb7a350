use std::time::Duration;

use anyhow::{Context, Result};
use conduit_runtime::config::env_or;

/// Consumer configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub database_url: String,
    pub queue: String,
    pub poll_interval: Duration,
}

impl ConsumerConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            queue: std::env::var("CONDUIT_QUEUE").context("CONDUIT_QUEUE must be set")?,
            poll_interval: Duration::from_millis(env_or("CONDUIT_POLL_INTERVAL_MS", 250)?),
        };

        config.log_summary();
        Ok(config)
    }

    fn log_summary(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(12).collect();
            format!("{head}...({} chars)", val.len())
        }

        tracing::info!("Consumer config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  CONDUIT_QUEUE: {}", self.queue);
        tracing::info!("  poll interval: {}ms", self.poll_interval.as_millis());
    }
}
