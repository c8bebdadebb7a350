//! Event representation for conduit.
//!
//! Records (ordered, possibly nested maps of typed values) convert to and from a
//! self-describing wire tree. Primitive leaves travel inline with a type tag;
//! complex leaves travel as escaped blobs tagged with their fully-qualified type
//! name and are rebuilt through the [`TypeRegistry`].

pub mod codec;
pub mod error;
pub mod node;
pub mod primitive;
pub mod registry;
pub mod serializer;
pub mod value;

pub use codec::Codec;
pub use error::{CodecError, Result};
pub use node::{WireEntry, WireNode, ROOT_NODE};
pub use primitive::PrimitiveKind;
pub use registry::{BlobDecoder, SchemaDescriptor, TypeRegistry};
pub use serializer::{ObjectEncoder, SerializerCache};
pub use value::{EventObject, ObjectValue, Record, Value};
