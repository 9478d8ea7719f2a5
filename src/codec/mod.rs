//! Identity-preserving object graph codec
//!
//! [`GraphWriter`] walks a live graph and produces an [`EncodedGraph`]: a flat table of
//! records indexed by id, where every identity-bearing object appears exactly once and
//! every reference to it, including the first, is an [`EncodedValue::Ref`] to its id.
//! [`GraphReader`] allocates a forward handle per record up front and decodes records
//! after the records they refer to, so cycles come back as the same shared instances.
//! Neither side recurses on the depth of the graph.
//!
//! Which encoding applies to a value is decided by the [`CodecRegistry`].

pub mod diagnostics;
pub mod identity;
pub mod kinds;
pub mod reader;
pub mod registry;
pub mod wire;
pub mod writer;

pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, TracingSink};
pub use identity::{ReadIdentities, WriteIdentities};
pub use reader::GraphReader;
pub use registry::{CodecRegistry, Substitution, UNSUPPORTED_CAPABILITY};
pub use wire::WireError;
pub use writer::GraphWriter;

use serde::Serialize;
use thiserror::Error;

/// Encoding tag of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Primitive,
    Enum,
    Array,
    List,
    Set,
    SortedSet,
    Map,
    SortedMap,
    ImmutableContainer,
    Substituted,
    CapturingFunction,
    ServiceReference,
    DeferredValue,
    Disallowed,
    /// Per-field encoding of an ordinary object
    Record,
}

impl ValueKind {
    pub const ALL: [ValueKind; 16] = [
        ValueKind::Null,
        ValueKind::Primitive,
        ValueKind::Enum,
        ValueKind::Array,
        ValueKind::List,
        ValueKind::Set,
        ValueKind::SortedSet,
        ValueKind::Map,
        ValueKind::SortedMap,
        ValueKind::ImmutableContainer,
        ValueKind::Substituted,
        ValueKind::CapturingFunction,
        ValueKind::ServiceReference,
        ValueKind::DeferredValue,
        ValueKind::Disallowed,
        ValueKind::Record,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Kinds encoded inline rather than as an identity-bearing record
    pub fn is_scalar(self) -> bool {
        matches!(self, ValueKind::Null | ValueKind::Primitive | ValueKind::Enum)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Primitive => "primitive",
            ValueKind::Enum => "enum",
            ValueKind::Array => "array",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::SortedSet => "sorted_set",
            ValueKind::Map => "map",
            ValueKind::SortedMap => "sorted_map",
            ValueKind::ImmutableContainer => "immutable_container",
            ValueKind::Substituted => "substituted",
            ValueKind::CapturingFunction => "capturing_function",
            ValueKind::ServiceReference => "service_reference",
            ValueKind::DeferredValue => "deferred_value",
            ValueKind::Disallowed => "disallowed",
            ValueKind::Record => "record",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded form of one value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    Enum {
        type_name: String,
        member: String,
        ordinal: u32,
    },
    /// The object encoded as the record with this id
    Ref(u32),
}

impl EncodedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EncodedValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            EncodedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<u32> {
        match self {
            EncodedValue::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: EncodedValue,
}

/// One identity-bearing object. Fields keep the order they were written in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedRecord {
    pub id: u32,
    pub kind: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub fields: Vec<Field>,
}

impl EncodedRecord {
    /// First field with the given name
    pub fn field(&self, name: &str) -> Option<&EncodedValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    pub fn require(&self, name: &str) -> Result<&EncodedValue, DecodeError> {
        self.field(name).ok_or_else(|| DecodeError::MissingField {
            kind: self.kind,
            field: name.to_string(),
        })
    }

    pub fn require_str(&self, name: &str) -> Result<&str, DecodeError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| self.malformed(format!("field '{name}' is not a string")))
    }

    pub fn require_size(&self) -> Result<usize, DecodeError> {
        let size = self
            .require("size")?
            .as_int()
            .ok_or_else(|| self.malformed("field 'size' is not an integer"))?;
        usize::try_from(size).map_err(|_| self.malformed(format!("negative size {size}")))
    }

    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a EncodedValue> {
        self.fields
            .iter()
            .filter(move |field| field.name == name)
            .map(|field| &field.value)
    }

    /// Ids of the records this one refers to, in field order
    pub fn references(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields.iter().filter_map(|field| field.value.as_ref_id())
    }

    pub fn malformed(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::Malformed {
            id: self.id,
            kind: self.kind,
            reason: reason.into(),
        }
    }
}

/// Linear encoding of an object graph: a root value plus the record table.
///
/// `records[i].id == i`. Ids are allocated in first-reference order, so the first
/// reference to any record other than the root comes from a record with a lower id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedGraph {
    pub root: EncodedValue,
    pub records: Vec<EncodedRecord>,
}

impl EncodedGraph {
    pub fn new(root: EncodedValue, records: Vec<EncodedRecord>) -> Self {
        Self { root, records }
    }

    /// Records in id order
    pub fn records(&self) -> &[EncodedRecord] {
        &self.records
    }

    pub fn record(&self, id: u32) -> Option<&EncodedRecord> {
        self.records.get(id as usize)
    }

    /// References to a record that had already been referenced earlier in the stream
    pub fn back_reference_count(&self) -> usize {
        let mut introduced = match self.root {
            EncodedValue::Ref(id) => u64::from(id) + 1,
            _ => 0,
        };
        let mut count = 0;
        for record in &self.records {
            for id in record.references() {
                if u64::from(id) < introduced {
                    count += 1;
                } else {
                    introduced = u64::from(id) + 1;
                }
            }
        }
        count
    }
}

/// Structural problems found while decoding. Any of these makes the stream unusable.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("reference to id {0}, which is not in the record table")]
    UnknownReference(u32),

    #[error("record id {found} out of sequence (expected {expected})")]
    UnexpectedId { expected: u32, found: u32 },

    #[error("record {0} was decoded twice")]
    AlreadyDecoded(u32),

    #[error("record kind '{0}' cannot appear as a record")]
    UnexpectedKind(ValueKind),

    #[error("{kind} record is missing field '{field}'")]
    MissingField { kind: ValueKind, field: String },

    #[error("malformed {kind} record {id}: {reason}")]
    Malformed {
        id: u32,
        kind: ValueKind,
        reason: String,
    },

    #[error("enum {type_name} has no member {member}")]
    UnknownEnumMember { type_name: String, member: String },

    #[error("no function body registered under '{0}'")]
    UnknownFunction(String),

    #[error("service '{0}' could not be resolved")]
    UnresolvedService(String),

    #[error("object {0} was referenced before it was resolved and never became an object")]
    UnresolvedForwardReference(u32),

    #[error(transparent)]
    Wire(#[from] WireError),
}
