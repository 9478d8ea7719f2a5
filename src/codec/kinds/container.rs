/// Containers: arrays, lists, sets, sorted sets, maps, sorted maps and frozen variants
///
/// Body layout: `size`, then `ordering = "natural"` for sorted shapes, then one `item`
/// field per element or alternating `key`/`value` fields per entry, in iteration order.
use super::{RecordBuilder, ValueCodec};
use crate::codec::reader::GraphReader;
use crate::codec::writer::GraphWriter;
use crate::codec::{DecodeError, EncodedRecord, EncodedValue, ValueKind};
use crate::graph::{Container, ContainerShape, Node, ObjRef, Value};

const NATURAL_ORDERING: &str = "natural";

pub fn kind_of(shape: ContainerShape) -> ValueKind {
    match shape {
        ContainerShape::Array => ValueKind::Array,
        ContainerShape::List => ValueKind::List,
        ContainerShape::Set => ValueKind::Set,
        ContainerShape::SortedSet => ValueKind::SortedSet,
        ContainerShape::Map => ValueKind::Map,
        ContainerShape::SortedMap => ValueKind::SortedMap,
    }
}

fn shape_of(kind: ValueKind) -> Option<ContainerShape> {
    match kind {
        ValueKind::Array => Some(ContainerShape::Array),
        ValueKind::List => Some(ContainerShape::List),
        ValueKind::Set => Some(ContainerShape::Set),
        ValueKind::SortedSet => Some(ContainerShape::SortedSet),
        ValueKind::Map => Some(ContainerShape::Map),
        ValueKind::SortedMap => Some(ContainerShape::SortedMap),
        _ => None,
    }
}

fn is_sorted(shape: ContainerShape) -> bool {
    matches!(shape, ContainerShape::SortedSet | ContainerShape::SortedMap)
}

fn snapshot(obj: &ObjRef) -> Option<Container> {
    match &*obj.borrow() {
        Node::Container(container) => Some(container.clone()),
        _ => None,
    }
}

fn write_body(writer: &mut GraphWriter<'_>, container: &Container, out: &mut RecordBuilder) {
    let shape = container.shape();
    out.size(container.len());
    if is_sorted(shape) {
        out.field("ordering", EncodedValue::Str(NATURAL_ORDERING.to_string()));
    }
    if shape.is_map() {
        for (key, value) in container.entries() {
            let key = writer.write_value(key);
            out.field("key", key);
            let value = writer.write_value(value);
            out.field("value", value);
        }
    } else {
        for item in container.items() {
            let item = writer.write_value(item);
            out.field("item", item);
        }
    }
}

/// Decode elements in field order, pairing each `key` with the `value` after it.
fn read_body(
    reader: &mut GraphReader<'_>,
    record: &EncodedRecord,
    shape: ContainerShape,
) -> Result<Container, DecodeError> {
    let size = record.require_size()?;
    if is_sorted(shape) {
        let ordering = record.require_str("ordering")?;
        if ordering != NATURAL_ORDERING {
            return Err(record.malformed(format!("unknown ordering '{ordering}'")));
        }
    }

    let mut items = Vec::new();
    let mut entries = Vec::new();
    let mut pending_key = None;

    for field in &record.fields {
        match field.name.as_str() {
            "size" | "ordering" | "shape" => {}
            "item" if !shape.is_map() => items.push(reader.read_value(&field.value)?),
            "key" if shape.is_map() && pending_key.is_none() => {
                pending_key = Some(reader.read_value(&field.value)?);
            }
            "value" if shape.is_map() => {
                let key = pending_key
                    .take()
                    .ok_or_else(|| record.malformed("map value without a key"))?;
                entries.push((key, reader.read_value(&field.value)?));
            }
            other => return Err(record.malformed(format!("unexpected field '{other}'"))),
        }
    }

    if pending_key.is_some() {
        return Err(record.malformed("map key without a value"));
    }
    let count = if shape.is_map() {
        entries.len()
    } else {
        items.len()
    };
    if count != size {
        return Err(record.malformed(format!("expected {size} elements, found {count}")));
    }

    // Sorted shapes are re-sorted by natural order rather than trusted as written.
    Ok(if shape.is_map() {
        Container::from_entries(shape, entries)
    } else {
        Container::from_shape(shape, items)
    })
}

pub struct ContainerCodec;

impl ValueCodec for ContainerCodec {
    fn encode(&self, writer: &mut GraphWriter<'_>, obj: &ObjRef, out: &mut RecordBuilder) {
        if let Some(container) = snapshot(obj) {
            write_body(writer, &container, out);
        }
    }

    fn decode(
        &self,
        reader: &mut GraphReader<'_>,
        record: &EncodedRecord,
    ) -> Result<Value, DecodeError> {
        let shape = shape_of(record.kind).ok_or(DecodeError::UnexpectedKind(record.kind))?;
        let container = read_body(reader, record, shape)?;
        let obj = reader
            .identities()
            .fill(record.id, Node::Container(container))?;
        Ok(Value::Object(obj))
    }
}

/// Frozen containers. The frozen flag is not restored: they decode into a plain
/// container of the same shape.
pub struct ImmutableCodec;

impl ValueCodec for ImmutableCodec {
    fn encode(&self, writer: &mut GraphWriter<'_>, obj: &ObjRef, out: &mut RecordBuilder) {
        if let Some(container) = snapshot(obj) {
            out.field(
                "shape",
                EncodedValue::Str(container.shape().as_str().to_string()),
            );
            write_body(writer, &container, out);
        }
    }

    fn decode(
        &self,
        reader: &mut GraphReader<'_>,
        record: &EncodedRecord,
    ) -> Result<Value, DecodeError> {
        let shape_name = record.require_str("shape")?;
        let shape = ContainerShape::parse(shape_name)
            .ok_or_else(|| record.malformed(format!("unknown shape '{shape_name}'")))?;
        let container = read_body(reader, record, shape)?;
        let obj = reader
            .identities()
            .fill(record.id, Node::Container(container))?;
        Ok(Value::Object(obj))
    }
}
