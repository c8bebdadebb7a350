//! Per-type encoders for complex values, cached by Rust type identity.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::error::{CodecError, Result};
use crate::registry::{BlobDecoder, TypeRegistry};
use crate::value::{EventObject, ObjectValue};

/// Encodes values of one type through the serialization contract found for it.
pub struct ObjectEncoder {
    type_name: String,
    contract_schema: String,
    members: Option<Vec<String>>,
    /// Set for projected encoders: the projected form must decode as the full type.
    read_back: Option<BlobDecoder>,
}

impl fmt::Debug for ObjectEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectEncoder")
            .field("type_name", &self.type_name)
            .field("contract_schema", &self.contract_schema)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

impl ObjectEncoder {
    /// The type this encoder was classified for.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The schema whose contract is applied (the type itself or an ancestor).
    pub fn contract_schema(&self) -> &str {
        &self.contract_schema
    }

    /// Members written, or `None` when the whole value is written.
    pub fn members(&self) -> Option<&[String]> {
        self.members.as_deref()
    }

    /// Encode a serde JSON tree into the escaped text carried on the wire.
    pub fn encode_json(&self, value: serde_json::Value) -> Result<String> {
        let value = match (&self.members, value) {
            (None, value) => value,
            (Some(members), serde_json::Value::Object(mut fields)) => {
                fields.retain(|key, _| members.iter().any(|m| m == key));
                serde_json::Value::Object(fields)
            }
            (Some(_), other) => {
                return Err(CodecError::NotSerializable(format!(
                    "{} has a member contract but serialized to a non-object ({other})",
                    self.type_name
                )));
            }
        };

        let text = serde_json::to_string(&value)
            .map_err(|e| CodecError::NotSerializable(format!("{}: {e}", self.type_name)))?;

        if let Some(read_back) = self.read_back {
            read_back(&text).map_err(|e| {
                CodecError::NotSerializable(format!(
                    "{} cannot be rebuilt from the {} contract: {e}",
                    self.type_name, self.contract_schema
                ))
            })?;
        }

        Ok(text)
    }

    pub fn encode_object(&self, object: &ObjectValue) -> Result<String> {
        let json = object
            .to_json()
            .map_err(|e| CodecError::NotSerializable(format!("{}: {e}", self.type_name)))?;
        self.encode_json(json)
    }

    pub fn encode<T: EventObject>(&self, value: &T) -> Result<String> {
        let json = serde_json::to_value(value)
            .map_err(|e| CodecError::NotSerializable(format!("{}: {e}", self.type_name)))?;
        self.encode_json(json)
    }
}

/// Process-wide cache of encoders. Lookups read a lock-free snapshot; first use
/// of a type classifies it under the population lock, so racing callers end up
/// sharing one encoder.
pub struct SerializerCache {
    snapshot: ArcSwap<HashMap<TypeId, Arc<ObjectEncoder>>>,
    populate: Mutex<()>,
}

impl Default for SerializerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerCache {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            populate: Mutex::new(()),
        }
    }

    pub fn encoder_for<T: EventObject>(&self, registry: &TypeRegistry) -> Result<Arc<ObjectEncoder>> {
        self.encoder(TypeId::of::<T>(), T::TYPE_NAME, registry)
    }

    pub fn encoder(
        &self,
        type_id: TypeId,
        type_name: &str,
        registry: &TypeRegistry,
    ) -> Result<Arc<ObjectEncoder>> {
        if let Some(encoder) = self.snapshot.load().get(&type_id) {
            return Ok(encoder.clone());
        }

        let _guard = self
            .populate
            .lock()
            .map_err(|_| CodecError::NotSerializable("serializer cache lock poisoned".into()))?;

        // Another caller may have populated the entry while we waited.
        if let Some(encoder) = self.snapshot.load().get(&type_id) {
            return Ok(encoder.clone());
        }

        let encoder = Arc::new(classify(type_id, type_name, registry)?);
        debug!(
            type_name,
            contract = encoder.contract_schema.as_str(),
            projected = encoder.members.is_some(),
            "Serializer cached"
        );

        let mut encoders = HashMap::clone(&self.snapshot.load());
        encoders.insert(type_id, encoder.clone());
        self.snapshot.store(Arc::new(encoders));

        Ok(encoder)
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Directly serializable first, then the nearest contract in the declared hierarchy.
fn classify(type_id: TypeId, type_name: &str, registry: &TypeRegistry) -> Result<ObjectEncoder> {
    let schema = registry
        .resolve_type(type_id)
        .ok_or_else(|| CodecError::NotSerializable(format!("no schema registered for {type_name}")))?;

    if schema.is_serializable() {
        return Ok(ObjectEncoder {
            type_name: type_name.to_string(),
            contract_schema: schema.name().to_string(),
            members: None,
            read_back: None,
        });
    }

    let lineage = registry.lineage(schema.name())?;
    let with_contract = lineage.iter().find_map(|s| s.contract().map(|m| (s, m)));

    match with_contract {
        Some((contract_schema, members)) => Ok(ObjectEncoder {
            type_name: type_name.to_string(),
            contract_schema: contract_schema.name().to_string(),
            members: Some(members.to_vec()),
            read_back: schema.blob_decoder(),
        }),
        None => Err(CodecError::NotSerializable(format!(
            "{type_name} is not serializable and declares no contract in its hierarchy"
        ))),
    }
}
