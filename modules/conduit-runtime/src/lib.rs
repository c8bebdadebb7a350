pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod loopback;
pub mod runtime;

pub use channel::{ChannelFactory, ControlChannel, ControlChannelManager};
pub use config::RuntimeConfig;
pub use envelope::{DeliveryClass, DeliveryEnvelope, EventPayload};
pub use error::{ChannelError, DispatchError, Result};
pub use http::{HttpChannelFactory, HttpControlChannel};
pub use loopback::{EvaluationHandler, LoopbackEngine, NoopHandler};
pub use runtime::EventRuntime;
