//! Binary stream format for encoded graphs
//!
//! ```text
//! stream  := "CCGR" version:u16 root:value count:u32 record*
//! record  := id:u32 kind:u8 has_type:u8 [type:str] count:u32 (name:str value)*
//! value   := tag:u8 body            (a scalar, or ref:u32 naming a record)
//! str     := len:u32 utf8 bytes
//! ```
//!
//! Records are stored flat in id order, so the stream is read without recursion however
//! deep the graph is. Integers are little-endian. The format is versioned but carries no compatibility
//! promise: a stream with another version is rejected, never migrated.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{EncodedGraph, EncodedRecord, EncodedValue, Field, ValueKind};

pub const MAGIC: &[u8; 4] = b"CCGR";
pub const FORMAT_VERSION: u16 = 2;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_CHAR: u8 = 4;
const TAG_STR: u8 = 5;
const TAG_ENUM: u8 = 6;
const TAG_REF: u8 = 7;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("not an encoded graph (bad magic)")]
    BadMagic,

    #[error("unsupported format version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("stream truncated at byte {0}")]
    Truncated(usize),

    #[error("unknown value tag {tag} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("unknown record kind {0}")]
    UnknownKind(u8),

    #[error("invalid UTF-8 in string at byte {0}")]
    InvalidUtf8(usize),

    #[error("invalid char code point {0:#x}")]
    InvalidChar(u32),

    #[error("{0} trailing bytes after the last record")]
    TrailingBytes(usize),
}

pub fn encode(graph: &EncodedGraph) -> Bytes {
    let mut buf = BytesMut::with_capacity(256);
    buf.put_slice(MAGIC);
    buf.put_u16_le(FORMAT_VERSION);
    put_value(&mut buf, &graph.root);
    buf.put_u32_le(graph.records.len() as u32);
    for record in &graph.records {
        put_record(&mut buf, record);
    }
    buf.freeze()
}

pub fn decode(data: &[u8]) -> Result<EncodedGraph, WireError> {
    let mut reader = WireReader {
        buf: data,
        len: data.len(),
    };

    let magic = reader.take(MAGIC.len())?;
    if magic != MAGIC {
        return Err(WireError::BadMagic);
    }
    let version = reader.u16()?;
    if version != FORMAT_VERSION {
        return Err(WireError::UnsupportedVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let root = reader.value()?;
    let count = reader.u32()? as usize;
    // Every record takes at least ten bytes, which bounds the allocation.
    let mut records = Vec::with_capacity(count.min(reader.buf.remaining() / 10));
    for _ in 0..count {
        records.push(reader.record()?);
    }

    if reader.buf.has_remaining() {
        return Err(WireError::TrailingBytes(reader.buf.remaining()));
    }
    Ok(EncodedGraph::new(root, records))
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn put_value(buf: &mut BytesMut, value: &EncodedValue) {
    match value {
        EncodedValue::Null => buf.put_u8(TAG_NULL),
        EncodedValue::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*b));
        }
        EncodedValue::Int(i) => {
            buf.put_u8(TAG_INT);
            buf.put_i64_le(*i);
        }
        EncodedValue::Float(f) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_f64_le(*f);
        }
        EncodedValue::Char(c) => {
            buf.put_u8(TAG_CHAR);
            buf.put_u32_le(u32::from(*c));
        }
        EncodedValue::Str(s) => {
            buf.put_u8(TAG_STR);
            put_str(buf, s);
        }
        EncodedValue::Enum {
            type_name,
            member,
            ordinal,
        } => {
            buf.put_u8(TAG_ENUM);
            put_str(buf, type_name);
            put_str(buf, member);
            buf.put_u32_le(*ordinal);
        }
        EncodedValue::Ref(id) => {
            buf.put_u8(TAG_REF);
            buf.put_u32_le(*id);
        }
    }
}

fn put_record(buf: &mut BytesMut, record: &EncodedRecord) {
    buf.put_u32_le(record.id);
    buf.put_u8(record.kind.tag());
    match &record.type_name {
        Some(type_name) => {
            buf.put_u8(1);
            put_str(buf, type_name);
        }
        None => buf.put_u8(0),
    }
    buf.put_u32_le(record.fields.len() as u32);
    for field in &record.fields {
        put_str(buf, &field.name);
        put_value(buf, &field.value);
    }
}

/// Bounds-checked cursor; `bytes::Buf` getters panic on underflow.
struct WireReader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> WireReader<'a> {
    fn offset(&self) -> usize {
        self.len - self.buf.remaining()
    }

    fn ensure(&self, n: usize) -> Result<(), WireError> {
        if self.buf.remaining() < n {
            return Err(WireError::Truncated(self.offset()));
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        self.ensure(n)?;
        let buf = self.buf;
        let (head, tail) = buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn str(&mut self) -> Result<String, WireError> {
        let len = self.u32()? as usize;
        let offset = self.offset();
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8(offset))
    }

    fn value(&mut self) -> Result<EncodedValue, WireError> {
        let offset = self.offset();
        let value = match self.u8()? {
            TAG_NULL => EncodedValue::Null,
            TAG_BOOL => EncodedValue::Bool(self.u8()? != 0),
            TAG_INT => {
                self.ensure(8)?;
                EncodedValue::Int(self.buf.get_i64_le())
            }
            TAG_FLOAT => {
                self.ensure(8)?;
                EncodedValue::Float(self.buf.get_f64_le())
            }
            TAG_CHAR => {
                let code = self.u32()?;
                EncodedValue::Char(char::from_u32(code).ok_or(WireError::InvalidChar(code))?)
            }
            TAG_STR => EncodedValue::Str(self.str()?),
            TAG_ENUM => EncodedValue::Enum {
                type_name: self.str()?,
                member: self.str()?,
                ordinal: self.u32()?,
            },
            TAG_REF => EncodedValue::Ref(self.u32()?),
            tag => return Err(WireError::UnknownTag { tag, offset }),
        };
        Ok(value)
    }

    fn record(&mut self) -> Result<EncodedRecord, WireError> {
        let id = self.u32()?;
        let kind_tag = self.u8()?;
        let kind = ValueKind::from_tag(kind_tag).ok_or(WireError::UnknownKind(kind_tag))?;
        let type_name = match self.u8()? {
            0 => None,
            _ => Some(self.str()?),
        };

        let count = self.u32()? as usize;
        // Every field takes at least five bytes, which bounds the allocation.
        let mut fields = Vec::with_capacity(count.min(self.buf.remaining() / 5));
        for _ in 0..count {
            let name = self.str()?;
            let value = self.value()?;
            fields.push(Field { name, value });
        }

        Ok(EncodedRecord {
            id,
            kind,
            type_name,
            fields,
        })
    }
}
