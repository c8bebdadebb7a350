//! In-process engine for embedding and tests.
//!
//! Submissions land in one of two lanes. `run_until_idle` evaluates them one
//! at a time and always drains the routed lane before admitting the next sent
//! event, so an event routed from inside an evaluation is seen before anything
//! still waiting behind it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::channel::{ChannelFactory, ControlChannel};
use crate::envelope::{DeliveryClass, DeliveryEnvelope};
use crate::error::ChannelError;

/// Evaluation logic run for each admitted event. May route or send further
/// events through a runtime connected to the same engine.
#[async_trait]
pub trait EvaluationHandler: Send + Sync {
    async fn evaluate(&self, envelope: &DeliveryEnvelope) -> Result<()>;
}

/// Handler that only records; useful when a test inspects `evaluated()`.
pub struct NoopHandler;

#[async_trait]
impl EvaluationHandler for NoopHandler {
    async fn evaluate(&self, _envelope: &DeliveryEnvelope) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Lanes {
    routed: VecDeque<DeliveryEnvelope>,
    sent: VecDeque<DeliveryEnvelope>,
}

struct Shared {
    instance_id: String,
    lanes: Mutex<Lanes>,
}

impl Shared {
    fn admit(&self, envelope: DeliveryEnvelope) -> Result<(), ChannelError> {
        if envelope.instance_id != self.instance_id {
            return Err(ChannelError::Rejected {
                status: 404,
                body: format!("unknown instance {}", envelope.instance_id),
            });
        }

        let mut lanes = self.lanes.lock().map_err(|_| ChannelError::Closed)?;
        match envelope.delivery {
            DeliveryClass::Route => lanes.routed.push_back(envelope),
            DeliveryClass::Send => lanes.sent.push_back(envelope),
        }
        Ok(())
    }

    fn next(&self) -> Option<DeliveryEnvelope> {
        let mut lanes = self.lanes.lock().ok()?;
        lanes.routed.pop_front().or_else(|| lanes.sent.pop_front())
    }
}

pub struct LoopbackEngine {
    shared: Arc<Shared>,
    handler: Arc<dyn EvaluationHandler>,
    evaluated: Mutex<Vec<DeliveryEnvelope>>,
    connections: AtomicUsize,
}

impl LoopbackEngine {
    pub fn new(instance_id: impl Into<String>, handler: Arc<dyn EvaluationHandler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                instance_id: instance_id.into(),
                lanes: Mutex::new(Lanes::default()),
            }),
            handler,
            evaluated: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.shared.instance_id
    }

    /// Evaluate pending events until both lanes are empty.
    /// Returns how many events were evaluated.
    pub async fn run_until_idle(&self) -> Result<usize> {
        let mut count = 0;

        while let Some(envelope) = self.shared.next() {
            debug!(
                delivery = envelope.delivery.as_str(),
                type_name = envelope.payload.type_name(),
                "Evaluating event"
            );
            self.evaluated
                .lock()
                .map_err(|_| anyhow::anyhow!("evaluation log poisoned"))?
                .push(envelope.clone());
            self.handler.evaluate(&envelope).await?;
            count += 1;
        }

        Ok(count)
    }

    /// Events in evaluation order (for assertions).
    pub fn evaluated(&self) -> Vec<DeliveryEnvelope> {
        self.evaluated
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn pending(&self) -> usize {
        self.shared
            .lanes
            .lock()
            .map(|lanes| lanes.routed.len() + lanes.sent.len())
            .unwrap_or_default()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelFactory for LoopbackEngine {
    async fn connect(&self) -> Result<Arc<dyn ControlChannel>, ChannelError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LoopbackChannel {
            shared: self.shared.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct LoopbackChannel {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

#[async_trait]
impl ControlChannel for LoopbackChannel {
    async fn submit(&self, envelope: &DeliveryEnvelope) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        self.shared.admit(envelope.clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
