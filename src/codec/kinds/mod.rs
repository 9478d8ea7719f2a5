//! Per-kind codecs
//!
//! Scalars (null, primitives, enums) are written inline by the writer. Every other kind
//! is an identity-bearing record handled by one of the codecs below.

pub mod container;
pub mod deferred;
pub mod disallowed;
pub mod function;
pub mod record;
pub mod scalar;
pub mod service;
pub mod substituted;

use super::reader::GraphReader;
use super::writer::GraphWriter;
use super::{DecodeError, EncodedRecord, EncodedValue, Field, ValueKind};
use crate::graph::{ObjRef, Value};

/// Encode/decode pair for one record kind.
///
/// `encode` runs after the writer has assigned the object its id; it only fills in the
/// record body, writing nested objects as references. `decode` must complete the record's identity slot, either by filling
/// the reserved forward handle or by completing it with a value.
pub trait ValueCodec {
    fn encode(&self, writer: &mut GraphWriter<'_>, obj: &ObjRef, out: &mut RecordBuilder);

    fn decode(
        &self,
        reader: &mut GraphReader<'_>,
        record: &EncodedRecord,
    ) -> Result<Value, DecodeError>;
}

/// Body of a record under construction
#[derive(Debug, Default)]
pub struct RecordBuilder {
    pub(crate) kind: Option<ValueKind>,
    pub(crate) type_name: Option<String>,
    pub(crate) fields: Vec<Field>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag the record with another kind than the one the object was classified as
    pub fn encode_as(&mut self, kind: ValueKind) -> &mut Self {
        self.kind = Some(kind);
        self
    }

    pub fn type_name(&mut self, type_name: impl Into<String>) -> &mut Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn field(&mut self, name: impl Into<String>, value: EncodedValue) -> &mut Self {
        self.fields.push(Field {
            name: name.into(),
            value,
        });
        self
    }

    pub fn size(&mut self, size: usize) -> &mut Self {
        self.field("size", EncodedValue::Int(size as i64))
    }
}
