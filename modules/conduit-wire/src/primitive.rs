//! Scalar kinds written inline as text plus a type tag.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{CodecError, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Bool,
    Int,
    UInt,
    Float,
    Char,
    String,
    Timestamp,
    Uuid,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Bool,
        PrimitiveKind::Int,
        PrimitiveKind::UInt,
        PrimitiveKind::Float,
        PrimitiveKind::Char,
        PrimitiveKind::String,
        PrimitiveKind::Timestamp,
        PrimitiveKind::Uuid,
    ];

    /// Type tag written to the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "i64",
            Self::UInt => "u64",
            Self::Float => "f64",
            Self::Char => "char",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// The primitive kind of a value, or `None` for null, records and objects.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(Self::Bool),
            Value::Int(_) => Some(Self::Int),
            Value::UInt(_) => Some(Self::UInt),
            Value::Float(_) => Some(Self::Float),
            Value::Char(_) => Some(Self::Char),
            Value::String(_) => Some(Self::String),
            Value::Timestamp(_) => Some(Self::Timestamp),
            Value::Uuid(_) => Some(Self::Uuid),
            Value::Null | Value::Record(_) | Value::Object(_) => None,
        }
    }

    /// Parse inline text into a value of this kind.
    pub fn parse(&self, text: &str) -> Result<Value> {
        let invalid = |reason: String| {
            CodecError::malformed(format!("invalid {} literal {text:?}: {reason}", self.tag()))
        };

        let value = match self {
            Self::Bool => Value::Bool(text.parse::<bool>().map_err(|e| invalid(format!("{e}")))?),
            Self::Int => Value::Int(text.parse::<i64>().map_err(|e| invalid(format!("{e}")))?),
            Self::UInt => Value::UInt(text.parse::<u64>().map_err(|e| invalid(format!("{e}")))?),
            Self::Float => Value::Float(text.parse::<f64>().map_err(|e| invalid(format!("{e}")))?),
            Self::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(invalid("expected exactly one character".into())),
                }
            }
            Self::String => Value::String(text.to_string()),
            Self::Timestamp => Value::Timestamp(
                DateTime::parse_from_rfc3339(text)
                    .map_err(|e| invalid(format!("{e}")))?
                    .with_timezone(&Utc),
            ),
            Self::Uuid => Value::Uuid(Uuid::parse_str(text).map_err(|e| invalid(format!("{e}")))?),
        };

        Ok(value)
    }
}

/// Inline text for a primitive value. `None` for null, records and objects.
pub fn format_inline(value: &Value) -> Option<String> {
    let text = match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        // Display for f64 is the shortest representation that parses back exactly.
        Value::Float(f) => f.to_string(),
        Value::Char(c) => c.to_string(),
        Value::String(s) => s.clone(),
        Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Value::Uuid(u) => u.to_string(),
        Value::Null | Value::Record(_) | Value::Object(_) => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tag_maps_back_to_its_kind() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(PrimitiveKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(PrimitiveKind::from_tag("acme.Widget"), None);
    }

    #[test]
    fn float_text_survives_parse() {
        let value = Value::Float(0.1 + 0.2);
        let text = format_inline(&value).unwrap();
        assert_eq!(PrimitiveKind::Float.parse(&text).unwrap(), value);
    }

    #[test]
    fn timestamp_keeps_subsecond_precision() {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T12:30:45.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = format_inline(&Value::Timestamp(ts)).unwrap();
        assert_eq!(PrimitiveKind::Timestamp.parse(&text).unwrap(), Value::Timestamp(ts));
    }

    #[test]
    fn bad_literal_is_malformed() {
        let err = PrimitiveKind::Int.parse("forty-two").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));

        let err = PrimitiveKind::Char.parse("ab").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
