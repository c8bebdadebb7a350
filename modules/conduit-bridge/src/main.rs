use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use conduit_bridge::{declare_event_types, event_types_from_env, forward_updates};
use conduit_consumer::{ConsumerConfig, PgBroker, QueueConsumer};
use conduit_runtime::{EventRuntime, HttpChannelFactory, RuntimeConfig};
use conduit_wire::{Codec, TypeRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("conduit=info".parse()?))
        .init();

    info!("Conduit bridge starting...");

    let runtime_config = RuntimeConfig::from_env()?;
    let consumer_config = ConsumerConfig::from_env()?;

    let registry = Arc::new(TypeRegistry::new());
    declare_event_types(&registry, &event_types_from_env())?;
    let codec = Codec::with_registry(registry);

    // Postgres queue (tables are created if missing)
    let pool = PgPool::connect(&consumer_config.database_url).await?;
    let broker = PgBroker::new(pool).with_poll_interval(consumer_config.poll_interval);
    broker.migrate().await?;

    let runtime = Arc::new(EventRuntime::new(
        runtime_config.instance_id.clone(),
        codec.clone(),
        Arc::new(HttpChannelFactory::from_config(&runtime_config)),
    ));

    // The consumer callback is synchronous; dispatch happens on the forwarder task.
    let (tx, rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_updates(rx, runtime.clone()));

    let consumer = QueueConsumer::builder(consumer_config.queue.as_str())
        .codec(codec)
        .on_update(move |update| {
            tx.send(update)?;
            Ok(())
        })
        .open(&broker)
        .await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    consumer.dispose();
    consumer.stopped().await;
    // Releasing the consumer drops the last sender, so the forwarder drains and exits.
    drop(consumer);

    let stats = forwarder.await?;
    runtime.dispose().await;

    info!("Bridge stopped. {stats}");
    Ok(())
}
