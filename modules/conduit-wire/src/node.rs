//! Serialized tree form of a record.
//!
//! The tree is independent of any markup syntax. It derives serde, so any serde
//! format is a valid textual encoding; JSON is the one used on the wire.

use serde::{Deserialize, Serialize};

/// Reserved name of every record container.
pub const ROOT_NODE: &str = "dictionary";

/// A named container of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireNode {
    pub name: String,
    #[serde(default)]
    pub entries: Vec<WireEntry>,
}

/// One field of a container.
///
/// A well-formed entry carries a key and at most one of `text`, `node` or `blob`.
/// Fields are optional here because trees arrive from untrusted sources and the
/// codec reports violations rather than the deserializer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    /// Inline primitive text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Nested record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<WireNode>,
    /// Escaped serialized form of a complex value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl WireNode {
    pub fn root() -> Self {
        Self {
            name: ROOT_NODE.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_NODE
    }

    pub fn entry(&self, key: &str) -> Option<&WireEntry> {
        self.entries
            .iter()
            .find(|e| e.key.as_deref() == Some(key))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl WireEntry {
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, tag: impl Into<String>) -> Self {
        self.type_tag = Some(tag.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_node(mut self, node: WireNode) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_blob(mut self, blob: impl Into<String>) -> Self {
        self.blob = Some(blob.into());
        self
    }
}
