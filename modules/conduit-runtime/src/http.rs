//! HTTP transport for the remote engine's control endpoint.
//!
//! One `reqwest::Client` per channel gives each runtime its own connection
//! pool, so runtimes targeting the same endpoint never share a connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::channel::{ChannelFactory, ControlChannel};
use crate::config::RuntimeConfig;
use crate::envelope::{DeliveryEnvelope, EventPayload};
use crate::error::ChannelError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpChannelFactory {
    endpoint: String,
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl HttpChannelFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.endpoint_url.clone())
            .with_timeouts(config.request_timeout, config.connect_timeout)
    }

    pub fn with_timeouts(mut self, request: Duration, connect: Duration) -> Self {
        self.request_timeout = request;
        self.connect_timeout = connect;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChannelFactory for HttpChannelFactory {
    async fn connect(&self) -> Result<Arc<dyn ControlChannel>, ChannelError> {
        let http = Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| ChannelError::Establish(e.to_string()))?;

        let url = format!("{}/health", self.endpoint);
        info!(url = url.as_str(), "Probing control endpoint");

        let resp = http.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Establish(format!(
                "health probe returned HTTP {status}: {body}"
            )));
        }

        Ok(Arc::new(HttpControlChannel {
            http,
            endpoint: self.endpoint.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct HttpControlChannel {
    http: Client,
    endpoint: String,
    closed: AtomicBool,
}

impl HttpControlChannel {
    fn submission_url(&self, envelope: &DeliveryEnvelope) -> String {
        let route = match envelope.payload {
            EventPayload::Named { .. } => "structured",
            EventPayload::Structural { .. } => "markup",
        };
        format!(
            "{}/instances/{}/events/{route}",
            self.endpoint, envelope.instance_id
        )
    }
}

#[async_trait]
impl ControlChannel for HttpControlChannel {
    async fn submit(&self, envelope: &DeliveryEnvelope) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }

        let url = self.submission_url(envelope);
        debug!(
            url = url.as_str(),
            delivery = envelope.delivery.as_str(),
            type_name = envelope.payload.type_name(),
            "Submitting event"
        );

        let resp = self.http.post(&url).json(envelope).send().await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(ChannelError::Rejected { status, body })
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
