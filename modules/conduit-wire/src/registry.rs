//! Type registry: maps fully-qualified type names to declared schemas.
//!
//! Callers populate the registry when they declare event and value types.
//! Resolution is a deterministic map lookup; the type hierarchy is the declared
//! parent chain of each schema. Reads take a lock-free snapshot, writes are
//! serialized and swap in a new snapshot.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::error::{CodecError, Result};
use crate::value::{EventObject, ObjectValue};

/// A declared schema.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    name: String,
    parent: Option<String>,
    serializable: bool,
    contract: Option<Vec<String>>,
    binding: Option<TypeBinding>,
}

/// Reads an embedded blob back into the bound Rust type.
pub type BlobDecoder = fn(&str) -> serde_json::Result<ObjectValue>;

#[derive(Clone, Copy)]
struct TypeBinding {
    type_id: TypeId,
    decode: BlobDecoder,
}

impl fmt::Debug for TypeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeBinding")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

fn decode_as<T: EventObject>(text: &str) -> serde_json::Result<ObjectValue> {
    serde_json::from_str::<T>(text).map(ObjectValue::new)
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            serializable: false,
            contract: None,
            binding: None,
        }
    }

    /// Descriptor named after an event object type.
    pub fn of<T: EventObject>() -> Self {
        Self::new(T::TYPE_NAME)
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Mark the type as serializable in full.
    pub fn serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    /// Declare a serialization contract: the members written when this schema,
    /// or any descendant without its own contract, is serialized.
    pub fn with_contract<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contract = Some(members.into_iter().map(Into::into).collect());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    pub fn contract(&self) -> Option<&[String]> {
        self.contract.as_deref()
    }

    pub fn bound_type(&self) -> Option<TypeId> {
        self.binding.map(|b| b.type_id)
    }

    pub fn blob_decoder(&self) -> Option<BlobDecoder> {
        self.binding.map(|b| b.decode)
    }

    /// Deserialize an embedded blob into the local type bound to this schema.
    pub fn decode_blob(&self, blob: &str) -> Result<ObjectValue> {
        let binding = self.binding.ok_or_else(|| {
            CodecError::UnresolvedType(format!("schema {} has no local type bound", self.name))
        })?;

        (binding.decode)(blob).map_err(|e| {
            CodecError::malformed(format!("unparsable payload for {}: {e}", self.name))
        })
    }
}

#[derive(Default, Clone)]
struct Schemas {
    by_name: HashMap<String, Arc<SchemaDescriptor>>,
    by_type: HashMap<TypeId, String>,
}

/// Registry of declared schemas, shared by the codec and the serializer cache.
pub struct TypeRegistry {
    snapshot: ArcSwap<Schemas>,
    write: Mutex<()>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Schemas::default()),
            write: Mutex::new(()),
        }
    }

    /// Declare a schema with no local Rust type (record event types, base schemas).
    pub fn declare(&self, descriptor: SchemaDescriptor) -> Result<Arc<SchemaDescriptor>> {
        self.insert(descriptor)
    }

    /// Bind an event object type to its schema.
    pub fn register<T: EventObject>(
        &self,
        mut descriptor: SchemaDescriptor,
    ) -> Result<Arc<SchemaDescriptor>> {
        if descriptor.name != T::TYPE_NAME {
            return Err(CodecError::Registration(format!(
                "descriptor {} does not match type name {}",
                descriptor.name,
                T::TYPE_NAME
            )));
        }

        descriptor.binding = Some(TypeBinding {
            type_id: TypeId::of::<T>(),
            decode: decode_as::<T>,
        });
        self.insert(descriptor)
    }

    fn insert(&self, mut descriptor: SchemaDescriptor) -> Result<Arc<SchemaDescriptor>> {
        let _guard = self
            .write
            .lock()
            .map_err(|_| CodecError::Registration("type registry lock poisoned".into()))?;

        let mut schemas = Schemas::clone(&self.snapshot.load());

        if let Some(existing) = schemas.by_name.get(&descriptor.name) {
            match (existing.binding, descriptor.binding) {
                (Some(old), Some(new)) if old.type_id != new.type_id => {
                    return Err(CodecError::Registration(format!(
                        "{} is already bound to a different type",
                        descriptor.name
                    )));
                }
                (Some(old), None) => descriptor.binding = Some(old),
                _ => {}
            }
        }

        if let Some(binding) = descriptor.binding {
            schemas.by_type.insert(binding.type_id, descriptor.name.clone());
        }

        debug!(
            schema = descriptor.name.as_str(),
            parent = descriptor.parent.as_deref(),
            bound = descriptor.binding.is_some(),
            "Schema declared"
        );

        let descriptor = Arc::new(descriptor);
        schemas
            .by_name
            .insert(descriptor.name.clone(), descriptor.clone());
        self.snapshot.store(Arc::new(schemas));

        Ok(descriptor)
    }

    /// Look up a schema by fully-qualified name.
    pub fn resolve(&self, name: &str) -> Result<Arc<SchemaDescriptor>> {
        self.snapshot
            .load()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::UnresolvedType(name.to_string()))
    }

    /// Look up the schema bound to a Rust type.
    pub fn resolve_type(&self, type_id: TypeId) -> Option<Arc<SchemaDescriptor>> {
        let schemas = self.snapshot.load();
        let name = schemas.by_type.get(&type_id)?;
        schemas.by_name.get(name).cloned()
    }

    /// The schema itself followed by its declared ancestors, nearest first.
    /// The walk stops at an undeclared parent or a cycle.
    pub fn lineage(&self, name: &str) -> Result<Vec<Arc<SchemaDescriptor>>> {
        let schemas = self.snapshot.load();
        let mut current = schemas
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::UnresolvedType(name.to_string()))?;

        let mut seen = HashSet::new();
        let mut chain = Vec::new();

        loop {
            if !seen.insert(current.name.clone()) {
                break;
            }
            chain.push(current.clone());

            let Some(parent) = current.parent.as_deref() else {
                break;
            };
            match schemas.by_name.get(parent) {
                Some(next) => current = next.clone(),
                None => {
                    debug!(schema = name, parent, "Parent schema not declared, lineage ends");
                    break;
                }
            }
        }

        Ok(chain)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot.load().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
