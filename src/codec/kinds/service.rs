/// Process-wide services: only the token is persisted
use super::{RecordBuilder, ValueCodec};
use crate::codec::reader::GraphReader;
use crate::codec::writer::GraphWriter;
use crate::codec::{DecodeError, EncodedRecord, EncodedValue};
use crate::graph::{Node, ObjRef, ServiceToken, Value};

pub struct ServiceCodec;

impl ValueCodec for ServiceCodec {
    fn encode(&self, _writer: &mut GraphWriter<'_>, obj: &ObjRef, out: &mut RecordBuilder) {
        if let Node::Service(service) = &*obj.borrow() {
            out.field("token", EncodedValue::Str(service.token().as_str().to_string()));
        }
    }

    fn decode(
        &self,
        reader: &mut GraphReader<'_>,
        record: &EncodedRecord,
    ) -> Result<Value, DecodeError> {
        let token = ServiceToken::new(record.require_str("token")?);
        let service = reader
            .locator()
            .resolve(&token)
            .ok_or_else(|| DecodeError::UnresolvedService(token.to_string()))?;
        reader.identities().complete(record.id, Value::Object(service))
    }
}
