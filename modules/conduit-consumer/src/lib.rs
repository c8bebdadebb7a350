pub mod config;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod notification;
pub mod postgres;
pub mod queue;

pub use config::ConsumerConfig;
pub use consumer::{ErrorHandler, QueueConsumer, QueueConsumerBuilder, UpdateCallback};
pub use error::{ConsumerError, QueueError};
pub use memory::{MemoryBroker, MemoryQueue};
pub use notification::{UpdateMessage, UpdateNotification};
pub use postgres::{PgBroker, PgQueue};
pub use queue::{DurableQueue, QueueBroker, QueueMessage};
