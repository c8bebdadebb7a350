//! What travels to the remote engine for a single submission.

use conduit_wire::WireNode;
use serde::{Deserialize, Serialize};

/// Send is externally originated; Route is re-injected from inside an
/// evaluation and takes priority over pending sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryClass {
    Send,
    Route,
}

impl DeliveryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Route => "route",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A strongly-typed object, already encoded through its serializer.
    Named { type_name: String, body: String },
    /// A record tree. `type_name` is absent only for raw markup submissions.
    Structural {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
        tree: WireNode,
    },
}

impl EventPayload {
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Named { type_name, .. } => Some(type_name),
            Self::Structural { type_name, .. } => type_name.as_deref(),
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }
}

/// Built fresh per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEnvelope {
    pub instance_id: String,
    pub delivery: DeliveryClass,
    pub payload: EventPayload,
}

impl DeliveryEnvelope {
    pub fn new(instance_id: impl Into<String>, delivery: DeliveryClass, payload: EventPayload) -> Self {
        Self {
            instance_id: instance_id.into(),
            delivery,
            payload,
        }
    }
}
