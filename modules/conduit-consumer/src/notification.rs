//! Update messages carried on the queue and their decoded form.

use chrono::{DateTime, Utc};
use conduit_wire::{Codec, CodecError, Record, WireNode};
use serde::{Deserialize, Serialize};

/// Wire form of a statement update, JSON-encoded in the message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub statement_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub new_events: Vec<WireNode>,
    #[serde(default)]
    pub old_events: Vec<WireNode>,
}

impl UpdateMessage {
    pub fn new(statement_id: impl Into<String>) -> Self {
        Self {
            statement_id: statement_id.into(),
            event_type: None,
            new_events: Vec::new(),
            old_events: Vec::new(),
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Encode a record into the new-events list.
    pub fn push_new(&mut self, codec: &Codec, record: &Record) -> Result<(), CodecError> {
        self.new_events.push(codec.encode(record)?);
        Ok(())
    }

    pub fn push_old(&mut self, codec: &Codec, record: &Record) -> Result<(), CodecError> {
        self.old_events.push(codec.encode(record)?);
        Ok(())
    }

    pub fn from_bytes(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode every event tree. Any failure rejects the whole update.
    pub fn decode(&self, codec: &Codec) -> Result<UpdateNotification, CodecError> {
        let decode_all = |trees: &[WireNode]| -> Result<Vec<Record>, CodecError> {
            trees.iter().map(|tree| codec.decode(tree)).collect()
        };

        Ok(UpdateNotification {
            statement_id: self.statement_id.clone(),
            event_type: self.event_type.clone(),
            new_events: decode_all(&self.new_events)?,
            old_events: decode_all(&self.old_events)?,
            received_at: Utc::now(),
        })
    }
}

/// A decoded statement update handed to the consumer callback.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateNotification {
    pub statement_id: String,
    pub event_type: Option<String>,
    pub new_events: Vec<Record>,
    pub old_events: Vec<Record>,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_wire::{TypeRegistry, WireEntry};
    use std::sync::Arc;

    fn codec() -> Codec {
        Codec::with_registry(Arc::new(TypeRegistry::new()))
    }

    #[test]
    fn decodes_new_and_old_events() {
        let codec = codec();
        let mut message = UpdateMessage::new("stmt-1").with_event_type("acme.Avg");
        message
            .push_new(&codec, &Record::new().with("avg", 10.5))
            .unwrap();
        message
            .push_old(&codec, &Record::new().with("avg", 9.0))
            .unwrap();

        let bytes = message.to_bytes().unwrap();
        let notification = UpdateMessage::from_bytes(&bytes)
            .unwrap()
            .decode(&codec)
            .unwrap();

        assert_eq!(notification.statement_id, "stmt-1");
        assert_eq!(notification.event_type.as_deref(), Some("acme.Avg"));
        assert_eq!(notification.new_events, vec![Record::new().with("avg", 10.5)]);
        assert_eq!(notification.old_events, vec![Record::new().with("avg", 9.0)]);
    }

    #[test]
    fn one_bad_tree_fails_the_update() {
        let mut bad = WireNode::root();
        bad.entries.push(WireEntry::keyed("x").with_type("f64"));

        let mut message = UpdateMessage::new("stmt-1");
        message.new_events.push(WireNode::root());
        message.new_events.push(bad);

        assert!(matches!(
            message.decode(&codec()),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let message = UpdateMessage::from_bytes(br#"{"statement_id":"s"}"#).unwrap();
        assert!(message.new_events.is_empty());
        assert!(message.old_events.is_empty());
    }
}
