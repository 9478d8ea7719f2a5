/// Per-field encoding of ordinary objects
use super::{RecordBuilder, ValueCodec};
use crate::codec::reader::GraphReader;
use crate::codec::writer::GraphWriter;
use crate::codec::{DecodeError, EncodedRecord};
use crate::graph::{Node, ObjRef, Record, Value};

pub struct RecordCodec;

impl ValueCodec for RecordCodec {
    fn encode(&self, writer: &mut GraphWriter<'_>, obj: &ObjRef, out: &mut RecordBuilder) {
        // Snapshot the fields so no borrow is held while children are walked.
        let record = match &*obj.borrow() {
            Node::Record(record) => record.clone(),
            _ => return,
        };

        out.type_name(record.type_name);
        for (name, value) in &record.fields {
            let encoded = writer.write_value(value);
            out.field(name.as_str(), encoded);
        }
    }

    fn decode(
        &self,
        reader: &mut GraphReader<'_>,
        record: &EncodedRecord,
    ) -> Result<Value, DecodeError> {
        let type_name = record
            .type_name
            .clone()
            .ok_or_else(|| record.malformed("record without a type name"))?;

        let mut fields = Vec::with_capacity(record.fields.len());
        for field in &record.fields {
            fields.push((field.name.clone(), reader.read_value(&field.value)?));
        }

        let obj = reader
            .identities()
            .fill(record.id, Node::Record(Record { type_name, fields }))?;
        Ok(Value::Object(obj))
    }
}
