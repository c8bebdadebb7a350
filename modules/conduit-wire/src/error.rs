use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The wire tree violates the record grammar.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// A type tag names a schema that is not registered, or has no local type bound to it.
    #[error("unresolved type: {0}")]
    UnresolvedType(String),

    /// The value's type has no discoverable serialization contract.
    #[error("type is not serializable: {0}")]
    NotSerializable(String),

    #[error("registration error: {0}")]
    Registration(String),
}

impl CodecError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        CodecError::Malformed(message.into())
    }
}
