use conduit_wire::CodecError;
use thiserror::Error;

/// Faults raised by a durable queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {0}")]
    NotFound(String),

    /// Safe to drop the current message and keep receiving.
    #[error("Transient queue fault: {0}")]
    Transient(String),

    #[error("Queue is closed")]
    Closed,

    #[error("Queue backend error: {0}")]
    Backend(String),
}

impl QueueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Consumer misconfigured: {0}")]
    Config(String),

    #[error("Consumer has been disposed")]
    Disposed,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Update payload could not be decoded: {0}")]
    Decode(#[from] CodecError),

    #[error("Update message is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Update callback failed: {0}")]
    Callback(#[source] anyhow::Error),
}
