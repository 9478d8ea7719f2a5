/// Placeholders for objects that must never be persisted
///
/// The rejected object is reported once per type and its reference decodes to null.
/// Sibling fields of the referencing object are unaffected.
use super::{RecordBuilder, ValueCodec};
use crate::codec::reader::GraphReader;
use crate::codec::writer::GraphWriter;
use crate::codec::{DecodeError, EncodedRecord, EncodedValue};
use crate::graph::{ObjRef, Value};

pub struct DisallowedCodec;

impl ValueCodec for DisallowedCodec {
    fn encode(&self, writer: &mut GraphWriter<'_>, obj: &ObjRef, out: &mut RecordBuilder) {
        let type_name = obj
            .type_name()
            .unwrap_or_else(|| obj.borrow().describe());
        let capability = writer.registry().capability_of(obj);

        writer.report(&type_name, &capability);
        out.type_name(type_name);
        out.field("capability", EncodedValue::Str(capability));
    }

    fn decode(
        &self,
        reader: &mut GraphReader<'_>,
        record: &EncodedRecord,
    ) -> Result<Value, DecodeError> {
        reader.identities().complete(record.id, Value::Null)
    }
}
