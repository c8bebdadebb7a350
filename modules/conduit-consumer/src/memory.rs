//! In-memory queues for embedding and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::error::QueueError;
use crate::queue::{DurableQueue, QueueBroker, QueueMessage};

/// Holds named in-memory queues. Queues must be created before they are opened.
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, Arc<MemoryQueue>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue, or return the existing one with that name.
    pub fn create_queue(&self, name: &str) -> Arc<MemoryQueue> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryQueue::new(name)))
            .clone()
    }

    pub fn queue(&self, name: &str) -> Option<Arc<MemoryQueue>> {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.get(name).cloned()
    }
}

#[async_trait]
impl QueueBroker for MemoryBroker {
    async fn open(&self, locator: &str) -> Result<Arc<dyn DurableQueue>, QueueError> {
        match self.queue(locator) {
            Some(queue) => Ok(queue as Arc<dyn DurableQueue>),
            None => Err(QueueError::NotFound(locator.to_string())),
        }
    }
}

/// FIFO of messages and injected faults, delivered in push order.
pub struct MemoryQueue {
    name: String,
    items: Mutex<VecDeque<Result<QueueMessage, QueueError>>>,
    available: Notify,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    next_id: AtomicI64,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            next_id: AtomicI64::new(1),
        }
    }

    /// Enqueue a message body. Returns its id.
    pub fn push(&self, body: impl Into<Vec<u8>>) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.enqueue(Ok(QueueMessage {
            id,
            body: body.into(),
            enqueued_at: Utc::now(),
        }));
        id
    }

    /// Make the next receive in line fail with `fault`.
    pub fn push_fault(&self, fault: QueueError) {
        self.enqueue(Err(fault));
    }

    fn enqueue(&self, item: Result<QueueMessage, QueueError>) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(item);
        self.available.notify_one();
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of times `close` has been called.
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self) -> Result<QueueMessage, QueueError> {
        loop {
            if self.is_closed() {
                return Err(QueueError::Closed);
            }

            let next = self
                .items
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            if let Some(item) = next {
                return item;
            }

            self.available.notified().await;
        }
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::Release);
        self.available.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_locator_is_not_found() {
        let broker = MemoryBroker::new();
        broker.create_queue("orders");

        assert!(broker.open("orders").await.is_ok());
        assert!(matches!(
            broker.open("payments").await.err(),
            Some(QueueError::NotFound(name)) if name == "payments"
        ));
    }

    #[tokio::test]
    async fn messages_and_faults_arrive_in_push_order() {
        let queue = MemoryQueue::new("orders");
        queue.push(b"one".to_vec());
        queue.push_fault(QueueError::Transient("flaky".into()));
        queue.push(b"two".to_vec());

        assert_eq!(queue.receive().await.unwrap().body, b"one");
        assert!(queue.receive().await.unwrap_err().is_transient());
        assert_eq!(queue.receive().await.unwrap().body, b"two");
    }

    #[tokio::test]
    async fn close_wakes_a_pending_receive() {
        let queue = Arc::new(MemoryQueue::new("orders"));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive().await })
        };

        tokio::task::yield_now().await;
        queue.close();

        assert!(matches!(waiter.await.unwrap(), Err(QueueError::Closed)));
        assert_eq!(queue.close_count(), 1);
    }
}
