/// Inline scalars: null, primitives and enums
use crate::codec::registry::CodecRegistry;
use crate::codec::{DecodeError, EncodedValue};
use crate::graph::Value;

/// Inline encoding of a scalar; `None` for objects
pub fn encode(value: &Value) -> Option<EncodedValue> {
    let encoded = match value {
        Value::Null => EncodedValue::Null,
        Value::Bool(b) => EncodedValue::Bool(*b),
        Value::Int(i) => EncodedValue::Int(*i),
        Value::Float(f) => EncodedValue::Float(*f),
        Value::Char(c) => EncodedValue::Char(*c),
        Value::Str(s) => EncodedValue::Str(s.clone()),
        Value::Enum(e) => EncodedValue::Enum {
            type_name: e.type_name.clone(),
            member: e.member.clone(),
            ordinal: e.ordinal,
        },
        Value::Object(_) => return None,
    };
    Some(encoded)
}

/// Decode an inline scalar; `None` for references to records
pub fn decode(
    registry: &CodecRegistry,
    value: &EncodedValue,
) -> Option<Result<Value, DecodeError>> {
    let decoded = match value {
        EncodedValue::Null => Value::Null,
        EncodedValue::Bool(b) => Value::Bool(*b),
        EncodedValue::Int(i) => Value::Int(*i),
        EncodedValue::Float(f) => Value::Float(*f),
        EncodedValue::Char(c) => Value::Char(*c),
        EncodedValue::Str(s) => Value::Str(s.clone()),
        EncodedValue::Enum {
            type_name,
            member,
            ordinal,
        } => {
            return Some(
                registry
                    .resolve_enum(type_name, member, *ordinal)
                    .map(Value::Enum),
            )
        }
        EncodedValue::Ref(_) => return None,
    };
    Some(Ok(decoded))
}
