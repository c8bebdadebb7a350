//! Record ⇄ wire tree conversion.

use std::sync::Arc;

use crate::error::{CodecError, Result};
use crate::node::{WireEntry, WireNode, ROOT_NODE};
use crate::primitive::{format_inline, PrimitiveKind};
use crate::registry::TypeRegistry;
use crate::serializer::SerializerCache;
use crate::value::{EventObject, Record, Value};

/// Converts records to and from wire trees.
///
/// Holds the registry used to resolve type tags on decode and the serializer
/// cache used to encode complex values. Cheap to clone.
#[derive(Clone)]
pub struct Codec {
    registry: Arc<TypeRegistry>,
    serializers: Arc<SerializerCache>,
}

impl Codec {
    pub fn new(registry: Arc<TypeRegistry>, serializers: Arc<SerializerCache>) -> Self {
        Self {
            registry,
            serializers,
        }
    }

    /// Codec over a registry with a fresh serializer cache.
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self::new(registry, Arc::new(SerializerCache::new()))
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn serializers(&self) -> &Arc<SerializerCache> {
        &self.serializers
    }

    pub fn encode(&self, record: &Record) -> Result<WireNode> {
        let mut node = WireNode::root();
        for (key, value) in record.iter() {
            node.entries.push(self.encode_entry(key, value)?);
        }
        Ok(node)
    }

    fn encode_entry(&self, key: &str, value: &Value) -> Result<WireEntry> {
        let entry = WireEntry::keyed(key);

        let entry = match value {
            Value::Null => entry,
            Value::Record(nested) => entry.with_node(self.encode(nested)?),
            Value::Object(object) => {
                let encoder = self.serializers.encoder(
                    object.object_type_id(),
                    object.type_name(),
                    &self.registry,
                )?;
                entry
                    .with_type(object.type_name())
                    .with_blob(encoder.encode_object(object)?)
            }
            scalar => {
                // Every remaining variant is a primitive.
                let (Some(kind), Some(text)) = (PrimitiveKind::of(scalar), format_inline(scalar))
                else {
                    return Err(CodecError::NotSerializable(format!("field {key}")));
                };
                entry.with_type(kind.tag()).with_text(text)
            }
        };

        Ok(entry)
    }

    pub fn decode(&self, node: &WireNode) -> Result<Record> {
        if node.name != ROOT_NODE {
            return Err(CodecError::malformed(format!(
                "expected container {ROOT_NODE:?}, found {:?}",
                node.name
            )));
        }

        let mut record = Record::new();
        for entry in &node.entries {
            let (key, value) = self.decode_entry(entry)?;
            record.insert(key, value);
        }
        Ok(record)
    }

    fn decode_entry(&self, entry: &WireEntry) -> Result<(String, Value)> {
        let key = entry
            .key
            .as_deref()
            .ok_or_else(|| CodecError::malformed("entry missing required attribute \"key\""))?;

        let value = match entry.type_tag.as_deref() {
            Some(tag) => match PrimitiveKind::from_tag(tag) {
                Some(kind) => {
                    if entry.node.is_some() || entry.blob.is_some() {
                        return Err(CodecError::malformed(format!(
                            "entry {key} is typed {tag} but carries a nested node or payload"
                        )));
                    }
                    let text = entry.text.as_deref().ok_or_else(|| {
                        CodecError::malformed(format!("entry {key} is typed {tag} but has no value"))
                    })?;
                    kind.parse(text)?
                }
                None => {
                    if entry.node.is_some() || entry.text.is_some() {
                        return Err(CodecError::malformed(format!(
                            "entry {key} is typed {tag} but carries a nested node or inline value"
                        )));
                    }
                    let blob = entry.blob.as_deref().ok_or_else(|| {
                        CodecError::malformed(format!(
                            "entry {key} is typed {tag} but has no embedded payload"
                        ))
                    })?;
                    let schema = self.registry.resolve(tag)?;
                    Value::Object(schema.decode_blob(blob)?)
                }
            },
            None => match (&entry.node, &entry.text, &entry.blob) {
                (Some(nested), None, None) => Value::Record(self.decode(nested)?),
                (None, None, None) => Value::Null,
                _ => {
                    return Err(CodecError::malformed(format!(
                        "entry {key} carries a value without a type tag"
                    )))
                }
            },
        };

        Ok((key.to_string(), value))
    }

    /// Encode a strongly-typed event body through its cached encoder.
    pub fn encode_event<T: EventObject>(&self, event: &T) -> Result<String> {
        self.serializers
            .encoder_for::<T>(&self.registry)?
            .encode(event)
    }
}
