/// Capturing function values
///
/// Only the body's registered name is persisted, together with the receiver and the
/// captured values. The body is looked up again by name on decode.
use super::{RecordBuilder, ValueCodec};
use crate::codec::reader::GraphReader;
use crate::codec::writer::GraphWriter;
use crate::codec::{DecodeError, EncodedRecord, EncodedValue};
use crate::graph::{CapturingFunction, Node, ObjRef, Value};

pub struct FunctionCodec;

impl ValueCodec for FunctionCodec {
    fn encode(&self, writer: &mut GraphWriter<'_>, obj: &ObjRef, out: &mut RecordBuilder) {
        let function = match &*obj.borrow() {
            Node::Function(function) => function.clone(),
            _ => return,
        };

        out.field("name", EncodedValue::Str(function.name().to_string()));
        if let Some(receiver) = function.receiver() {
            let receiver = writer.write_value(receiver);
            out.field("receiver", receiver);
        }
        out.size(function.captures().len());
        for captured in function.captures() {
            let captured = writer.write_value(captured);
            out.field("capture", captured);
        }
    }

    fn decode(
        &self,
        reader: &mut GraphReader<'_>,
        record: &EncodedRecord,
    ) -> Result<Value, DecodeError> {
        let name = record.require_str("name")?.to_string();
        let body = reader
            .registry()
            .functions()
            .body(&name)
            .ok_or_else(|| DecodeError::UnknownFunction(name.clone()))?;
        let size = record.require_size()?;

        let mut receiver = None;
        let mut captures = Vec::with_capacity(size);
        for field in &record.fields {
            match field.name.as_str() {
                "name" | "size" => {}
                "receiver" if receiver.is_none() => {
                    receiver = Some(reader.read_value(&field.value)?);
                }
                "capture" => captures.push(reader.read_value(&field.value)?),
                other => return Err(record.malformed(format!("unexpected field '{other}'"))),
            }
        }
        if captures.len() != size {
            return Err(record.malformed(format!(
                "expected {size} captured values, found {}",
                captures.len()
            )));
        }

        let function = CapturingFunction::new(name, body, receiver, captures);
        let obj = reader.identities().fill(record.id, Node::Function(function))?;
        Ok(Value::Object(obj))
    }
}
