/// Deferred values
///
/// A supplied value is evaluated once at encode time. If the supplier succeeds the
/// result is persisted as resolved; if it fails the supplier itself is persisted and the
/// failure resurfaces only when the decoded value is read.
use tracing::debug;

use super::{RecordBuilder, ValueCodec};
use crate::codec::reader::GraphReader;
use crate::codec::writer::GraphWriter;
use crate::codec::{DecodeError, EncodedRecord, EncodedValue};
use crate::graph::{invoke_supplier, Deferred, DeferredState, Node, ObjRef, Value};
use crate::logging::operations;

const UNSET: &str = "unset";
const RESOLVED: &str = "resolved";
const FAILING: &str = "failing";

pub struct DeferredCodec;

impl ValueCodec for DeferredCodec {
    fn encode(&self, writer: &mut GraphWriter<'_>, obj: &ObjRef, out: &mut RecordBuilder) {
        let state = match &*obj.borrow() {
            Node::Deferred(deferred) => deferred.state().clone(),
            _ => return,
        };

        match state {
            DeferredState::Unset => {
                out.field("state", EncodedValue::Str(UNSET.to_string()));
            }
            DeferredState::Resolved(value) => {
                out.field("state", EncodedValue::Str(RESOLVED.to_string()));
                let value = writer.write_value(&value);
                out.field("value", value);
            }
            DeferredState::Supplied(supplier) => {
                match invoke_supplier(&supplier) {
                    Ok(value) => {
                        out.field("state", EncodedValue::Str(RESOLVED.to_string()));
                        let value = writer.write_value(&value);
                        out.field("value", value);
                    }
                    Err(failure) => {
                        debug!(
                            operation = operations::ENCODE,
                            reason = %failure,
                            "deferred value failed, persisting its supplier"
                        );
                        out.field("state", EncodedValue::Str(FAILING.to_string()));
                        let supplier = writer.write_value(&Value::Object(supplier));
                        out.field("supplier", supplier);
                    }
                }
            }
        }
    }

    fn decode(
        &self,
        reader: &mut GraphReader<'_>,
        record: &EncodedRecord,
    ) -> Result<Value, DecodeError> {
        let state = record.require_str("state")?.to_string();

        let deferred = match state.as_str() {
            UNSET => Deferred::unset(),
            RESOLVED => Deferred::resolved(reader.read_value(record.require("value")?)?),
            FAILING => match reader.read_value(record.require("supplier")?)? {
                Value::Object(supplier) => Deferred::from_supplier(supplier),
                _ => return Err(record.malformed("supplier is not an object")),
            },
            other => return Err(record.malformed(format!("unknown state '{other}'"))),
        };

        let obj = reader.identities().fill(record.id, Node::Deferred(deferred))?;
        Ok(Value::Object(obj))
    }
}
