//! Queue consumer: receive, decode, hand off, repeat until disposed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use conduit_wire::{Codec, TypeRegistry};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ConsumerError, QueueError};
use crate::notification::{UpdateMessage, UpdateNotification};
use crate::queue::{DurableQueue, QueueBroker, QueueMessage};

pub type UpdateCallback = Arc<dyn Fn(UpdateNotification) -> anyhow::Result<()> + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&ConsumerError) + Send + Sync>;

const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

pub struct QueueConsumerBuilder {
    locator: String,
    codec: Option<Codec>,
    on_update: Option<UpdateCallback>,
    on_error: Option<ErrorHandler>,
    backoff: Duration,
}

impl QueueConsumerBuilder {
    /// Codec used to decode event trees. Defaults to one over an empty registry,
    /// which handles records of primitives only.
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Called for every decoded update, in receipt order.
    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(UpdateNotification) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(callback));
        self
    }

    /// Receives decode, callback and backend failures. Defaults to a warning log.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ConsumerError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Pause after a non-transient backend fault before receiving again.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Open the queue and start listening. A locator the broker does not know
    /// is a configuration error.
    pub async fn open<B: QueueBroker + ?Sized>(
        self,
        broker: &B,
    ) -> Result<QueueConsumer, ConsumerError> {
        let on_update = self
            .on_update
            .ok_or_else(|| ConsumerError::Config("no update callback registered".into()))?;

        let queue = broker.open(&self.locator).await.map_err(|e| match e {
            QueueError::NotFound(name) => {
                ConsumerError::Config(format!("queue {name} does not exist"))
            }
            other => ConsumerError::Queue(other),
        })?;

        let locator = self.locator;
        let on_error = self.on_error.unwrap_or_else(|| {
            let locator = locator.clone();
            let handler: ErrorHandler = Arc::new(move |err: &ConsumerError| {
                warn!(locator = locator.as_str(), error = %err, "Update dropped");
            });
            handler
        });

        let shared = Arc::new(Shared {
            locator,
            codec: self
                .codec
                .unwrap_or_else(|| Codec::with_registry(Arc::new(TypeRegistry::new()))),
            slot: ArcSwapOption::from_pointee(Slot { queue, on_update }),
            on_error,
            shutdown: Notify::new(),
            backoff: self.backoff,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        info!(locator = shared.locator.as_str(), "Queue consumer listening");
        let task = tokio::spawn(run(shared.clone()));

        Ok(QueueConsumer {
            shared,
            task: Mutex::new(Some(task)),
        })
    }
}

struct Slot {
    queue: Arc<dyn DurableQueue>,
    on_update: UpdateCallback,
}

struct Shared {
    locator: String,
    codec: Codec,
    /// Present while listening. Taken exactly once by `dispose`.
    slot: ArcSwapOption<Slot>,
    on_error: ErrorHandler,
    shutdown: Notify,
    backoff: Duration,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn deliver(&self, message: QueueMessage) {
        let decoded = UpdateMessage::from_bytes(&message.body)
            .map_err(ConsumerError::from)
            .and_then(|update| update.decode(&self.codec).map_err(ConsumerError::from));

        let notification = match decoded {
            Ok(notification) => notification,
            Err(err) => return (self.on_error)(&err),
        };

        // Re-read the slot: a dispose during decoding has released the callback.
        let Some(slot) = self.slot.load_full() else {
            debug!(locator = self.locator.as_str(), id = message.id, "Disposed before hand-off, update discarded");
            return;
        };

        match (slot.on_update)(notification) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(locator = self.locator.as_str(), id = message.id, "Update delivered");
            }
            Err(err) => (self.on_error)(&ConsumerError::Callback(err)),
        }
    }

    /// The queue closed without a dispose. Enter the disposed state so callers
    /// observe that nothing is draining any more.
    fn abandon(&self) {
        let Some(slot) = self.slot.swap(None) else {
            return;
        };
        slot.queue.close();
        warn!(locator = self.locator.as_str(), "Queue closed underneath consumer, consumer disposed");
        (self.on_error)(&ConsumerError::Queue(QueueError::Closed));
    }
}

/// Listens on a durable queue and hands each decoded update to a callback.
///
/// Listening starts when the consumer is opened. Transient queue faults drop
/// the affected message and the loop carries on; anything else goes to the
/// error handler. A queue that closes on its own leaves the consumer disposed.
/// Dropping the consumer disposes it.
pub struct QueueConsumer {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl QueueConsumer {
    pub fn builder(locator: impl Into<String>) -> QueueConsumerBuilder {
        QueueConsumerBuilder {
            locator: locator.into(),
            codec: None,
            on_update: None,
            on_error: None,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn locator(&self) -> &str {
        &self.shared.locator
    }

    /// Stop listening, release the callback and close the queue.
    ///
    /// Safe to call any number of times from any thread; the queue is closed
    /// by exactly one caller.
    pub fn dispose(&self) {
        let Some(slot) = self.shared.slot.swap(None) else {
            return;
        };
        slot.queue.close();
        self.shared.shutdown.notify_one();
        info!(locator = self.shared.locator.as_str(), "Queue consumer disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.slot.load().is_none()
    }

    /// Fails with `Disposed` once the consumer has been disposed.
    pub fn ensure_listening(&self) -> Result<(), ConsumerError> {
        if self.is_disposed() {
            Err(ConsumerError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Wait for the receive loop to exit.
    pub async fn stopped(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(locator = self.shared.locator.as_str(), error = %e, "Consumer loop panicked");
            }
        }
    }

    /// Updates handed to the callback successfully.
    pub fn delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Messages lost to transient queue faults.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for QueueConsumer {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run(shared: Arc<Shared>) {
    let locator = shared.locator.clone();

    loop {
        let Some(slot) = shared.slot.load_full() else {
            break;
        };

        let received = tokio::select! {
            biased;
            _ = shared.shutdown.notified() => break,
            received = slot.queue.receive() => received,
        };

        // A receive that completes after disposal is discarded, not acted upon.
        if shared.slot.load().is_none() {
            debug!(locator = locator.as_str(), "Receive completed after dispose, discarded");
            break;
        }

        match received {
            Ok(message) => shared.deliver(message),
            Err(QueueError::Transient(reason)) => {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(locator = locator.as_str(), reason = reason.as_str(), "Transient queue fault, message dropped");
            }
            Err(QueueError::Closed) => {
                shared.abandon();
                break;
            }
            Err(other) => {
                (shared.on_error)(&ConsumerError::Queue(other));
                tokio::time::sleep(shared.backoff).await;
            }
        }
    }

    debug!(locator = locator.as_str(), "Consumer loop stopped");
}
