//! Control channel traits and the per-runtime channel manager.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::envelope::DeliveryEnvelope;
use crate::error::{ChannelError, DispatchError};

/// A live connection to one remote engine endpoint.
///
/// Submissions may run concurrently on the same channel.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn submit(&self, envelope: &DeliveryEnvelope) -> Result<(), ChannelError>;

    /// Release transport resources. Called once by the owning manager.
    async fn close(&self) {}
}

/// Establishes control channels. Every successful `connect` yields a new channel.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ControlChannel>, ChannelError>;
}

#[async_trait]
impl<F: ChannelFactory + ?Sized> ChannelFactory for Arc<F> {
    async fn connect(&self) -> Result<Arc<dyn ControlChannel>, ChannelError> {
        (**self).connect().await
    }
}

enum ChannelState {
    Idle,
    Open(Arc<dyn ControlChannel>),
    Disposed,
}

/// Owns at most one control channel for the lifetime of a runtime.
///
/// The channel is established on the first `channel()` call. Concurrent first
/// callers wait on the state lock, so exactly one of them connects and the rest
/// observe its channel. The lock is only held for the state transition; request
/// traffic on the returned channel is not serialized.
pub struct ControlChannelManager {
    factory: Arc<dyn ChannelFactory>,
    state: Mutex<ChannelState>,
}

impl ControlChannelManager {
    pub fn new(factory: Arc<dyn ChannelFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(ChannelState::Idle),
        }
    }

    pub async fn channel(&self) -> Result<Arc<dyn ControlChannel>, DispatchError> {
        let mut state = self.state.lock().await;

        match &*state {
            ChannelState::Open(channel) => Ok(channel.clone()),
            ChannelState::Disposed => Err(DispatchError::Disposed),
            ChannelState::Idle => {
                // A failed attempt leaves the state Idle so the next caller retries.
                let channel = self.factory.connect().await.map_err(|e| {
                    warn!(error = %e, "Control channel establishment failed");
                    DispatchError::ChannelUnavailable(e)
                })?;
                info!("Control channel established");
                *state = ChannelState::Open(channel.clone());
                Ok(channel)
            }
        }
    }

    /// Tear down the channel. Only the first call has any effect.
    /// Returns whether this call performed the teardown.
    pub async fn dispose(&self) -> bool {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, ChannelState::Disposed)
        };

        match previous {
            ChannelState::Disposed => false,
            ChannelState::Idle => {
                debug!("Channel manager disposed before first use");
                true
            }
            ChannelState::Open(channel) => {
                channel.close().await;
                info!("Control channel closed");
                true
            }
        }
    }

    pub async fn is_disposed(&self) -> bool {
        matches!(*self.state.lock().await, ChannelState::Disposed)
    }

    pub async fn is_open(&self) -> bool {
        matches!(*self.state.lock().await, ChannelState::Open(_))
    }
}
