//! Dispatch façade: send and route events to the remote engine instance.

use std::sync::Arc;

use conduit_wire::{Codec, EventObject, Record, WireNode};
use tracing::{debug, info};

use crate::channel::{ChannelFactory, ControlChannelManager};
use crate::envelope::{DeliveryClass, DeliveryEnvelope, EventPayload};
use crate::error::{DispatchError, Result};

/// Client-side handle on one remote engine instance.
///
/// Every payload is encoded before the control channel is touched, so a record
/// with an undeclared event type or an object without a serialization contract
/// fails without any network traffic. A disposed runtime fails with `Disposed`
/// before anything is encoded.
pub struct EventRuntime {
    instance_id: String,
    codec: Codec,
    channels: ControlChannelManager,
}

impl EventRuntime {
    pub fn new(
        instance_id: impl Into<String>,
        codec: Codec,
        factory: Arc<dyn ChannelFactory>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            codec,
            channels: ControlChannelManager::new(factory),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn channels(&self) -> &ControlChannelManager {
        &self.channels
    }

    // --- Send: externally originated, ordinary priority ---

    pub async fn send_record(&self, event_type: &str, record: &Record) -> Result<()> {
        self.ensure_live().await?;
        let payload = self.record_payload(event_type, record)?;
        self.submit(DeliveryClass::Send, payload).await
    }

    pub async fn send_object<T: EventObject>(&self, event: &T) -> Result<()> {
        self.ensure_live().await?;
        let payload = self.object_payload(event)?;
        self.submit(DeliveryClass::Send, payload).await
    }

    pub async fn send_tree(&self, tree: WireNode) -> Result<()> {
        self.ensure_live().await?;
        let payload = self.tree_payload(tree)?;
        self.submit(DeliveryClass::Send, payload).await
    }

    // --- Route: re-injected from inside an evaluation, drained first ---

    pub async fn route_record(&self, event_type: &str, record: &Record) -> Result<()> {
        self.ensure_live().await?;
        let payload = self.record_payload(event_type, record)?;
        self.submit(DeliveryClass::Route, payload).await
    }

    pub async fn route_object<T: EventObject>(&self, event: &T) -> Result<()> {
        self.ensure_live().await?;
        let payload = self.object_payload(event)?;
        self.submit(DeliveryClass::Route, payload).await
    }

    pub async fn route_tree(&self, tree: WireNode) -> Result<()> {
        self.ensure_live().await?;
        let payload = self.tree_payload(tree)?;
        self.submit(DeliveryClass::Route, payload).await
    }

    /// Close the control channel. Later submissions fail with `Disposed`.
    pub async fn dispose(&self) {
        if self.channels.dispose().await {
            info!(instance_id = self.instance_id.as_str(), "Event runtime disposed");
        }
    }

    pub async fn is_disposed(&self) -> bool {
        self.channels.is_disposed().await
    }

    async fn ensure_live(&self) -> Result<()> {
        if self.channels.is_disposed().await {
            return Err(DispatchError::Disposed);
        }
        Ok(())
    }

    fn record_payload(&self, event_type: &str, record: &Record) -> Result<EventPayload> {
        self.codec.registry().resolve(event_type)?;
        Ok(EventPayload::Structural {
            type_name: Some(event_type.to_string()),
            tree: self.codec.encode(record)?,
        })
    }

    fn object_payload<T: EventObject>(&self, event: &T) -> Result<EventPayload> {
        Ok(EventPayload::Named {
            type_name: T::TYPE_NAME.to_string(),
            body: self.codec.encode_event(event)?,
        })
    }

    /// Raw trees are decoded once so type tags are resolved locally.
    fn tree_payload(&self, tree: WireNode) -> Result<EventPayload> {
        self.codec.decode(&tree)?;
        Ok(EventPayload::Structural {
            type_name: None,
            tree,
        })
    }

    async fn submit(&self, delivery: DeliveryClass, payload: EventPayload) -> Result<()> {
        let channel = self.channels.channel().await?;
        let envelope = DeliveryEnvelope::new(self.instance_id.clone(), delivery, payload);

        debug!(
            instance_id = self.instance_id.as_str(),
            delivery = delivery.as_str(),
            type_name = envelope.payload.type_name(),
            "Dispatching event"
        );

        channel.submit(&envelope).await?;
        Ok(())
    }
}
