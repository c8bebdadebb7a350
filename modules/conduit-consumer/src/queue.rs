//! Durable queue abstraction consumed by `QueueConsumer`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::QueueError;

/// One message removed from a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub id: i64,
    pub body: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}

/// A named, pre-existing queue.
///
/// `receive` waits until a message is available, the queue is closed, or the
/// backend faults. `close` is synchronous and wakes any pending receive, which
/// then resolves to `QueueError::Closed`.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    fn name(&self) -> &str;

    async fn receive(&self) -> Result<QueueMessage, QueueError>;

    fn close(&self);
}

/// Resolves queue locators. Opening an unknown locator is `QueueError::NotFound`.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    async fn open(&self, locator: &str) -> Result<Arc<dyn DurableQueue>, QueueError>;
}

#[async_trait]
impl<B: QueueBroker + ?Sized> QueueBroker for Arc<B> {
    async fn open(&self, locator: &str) -> Result<Arc<dyn DurableQueue>, QueueError> {
        (**self).open(locator).await
    }
}
