//! Postgres-backed durable queues.
//!
//! Queues are rows in `queues`; messages live in `queue_messages` until a
//! consumer claims them. A claim deletes the oldest row with
//! `FOR UPDATE SKIP LOCKED`, so competing consumers never see the same message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::error::QueueError;
use crate::queue::{DurableQueue, QueueBroker, QueueMessage};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct PgBroker {
    pool: PgPool,
    poll_interval: Duration,
}

impl PgBroker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How long an idle receive sleeps before checking for new rows.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Create the queue tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queues (
                name        TEXT         PRIMARY KEY,
                created_at  TIMESTAMPTZ  NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                id           BIGSERIAL    PRIMARY KEY,
                queue        TEXT         NOT NULL REFERENCES queues(name) ON DELETE CASCADE,
                body         BYTEA        NOT NULL,
                enqueued_at  TIMESTAMPTZ  NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS queue_messages_queue_id ON queue_messages (queue, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    pub async fn create_queue(&self, name: &str) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO queues (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        info!(queue = name, "Queue created");
        Ok(())
    }

    /// Append a message. Returns its id.
    pub async fn enqueue(&self, queue: &str, body: &[u8]) -> Result<i64, QueueError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO queue_messages (queue, body) VALUES ($1, $2) RETURNING id",
        )
        .bind(queue)
        .bind(body)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Ok(row.0)
    }
}

#[async_trait]
impl QueueBroker for PgBroker {
    async fn open(&self, locator: &str) -> Result<Arc<dyn DurableQueue>, QueueError> {
        let exists = sqlx::query_as::<_, (String,)>("SELECT name FROM queues WHERE name = $1")
            .bind(locator)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        if exists.is_none() {
            return Err(QueueError::NotFound(locator.to_string()));
        }

        Ok(Arc::new(PgQueue {
            pool: self.pool.clone(),
            name: locator.to_string(),
            poll_interval: self.poll_interval,
            closed: AtomicBool::new(false),
            wake: Notify::new(),
        }))
    }
}

pub struct PgQueue {
    pool: PgPool,
    name: String,
    poll_interval: Duration,
    closed: AtomicBool,
    wake: Notify,
}

impl PgQueue {
    async fn claim(&self) -> Result<Option<QueueMessage>, QueueError> {
        let row = sqlx::query_as::<_, (i64, Vec<u8>, DateTime<Utc>)>(
            r#"
            DELETE FROM queue_messages
            WHERE id = (
                SELECT id FROM queue_messages
                WHERE queue = $1
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, body, enqueued_at
            "#,
        )
        .bind(&self.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        Ok(row.map(|(id, body, enqueued_at)| QueueMessage {
            id,
            body,
            enqueued_at,
        }))
    }
}

#[async_trait]
impl DurableQueue for PgQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self) -> Result<QueueMessage, QueueError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(QueueError::Closed);
            }

            if let Some(message) = self.claim().await? {
                debug!(queue = self.name.as_str(), id = message.id, "Message claimed");
                return Ok(message);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.wake.notified() => {}
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

/// Connection-level failures are transient; everything else is a backend error.
fn classify(err: sqlx::Error) -> QueueError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => {
            QueueError::Transient(err.to_string())
        }
        sqlx::Error::PoolClosed => QueueError::Closed,
        other => QueueError::Backend(other.to_string()),
    }
}
