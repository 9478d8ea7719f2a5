/// Objects persisted through a type-declared substitute
use super::{RecordBuilder, ValueCodec};
use crate::codec::reader::GraphReader;
use crate::codec::writer::GraphWriter;
use crate::codec::{DecodeError, EncodedRecord};
use crate::graph::{ObjRef, Value};

pub struct SubstitutedCodec;

impl ValueCodec for SubstitutedCodec {
    fn encode(&self, writer: &mut GraphWriter<'_>, obj: &ObjRef, out: &mut RecordBuilder) {
        let Some(type_name) = obj.type_name() else {
            return;
        };
        let Some(hook) = writer.registry().write_hook(&type_name) else {
            return;
        };

        let replacement = hook(obj);
        if matches!(&replacement, Value::Object(same) if same.ptr_eq(obj)) {
            // A hook that returns its own input persists the object as is.
            let kind = writer.encode_body(obj, false, out);
            out.encode_as(kind);
            return;
        }
        out.type_name(type_name);
        let substitute = writer.write_replacement(&replacement);
        out.field("substitute", substitute);
    }

    fn decode(
        &self,
        reader: &mut GraphReader<'_>,
        record: &EncodedRecord,
    ) -> Result<Value, DecodeError> {
        let substitute = reader.read_value(record.require("substitute")?)?;

        let hook = substitute
            .as_object()
            .and_then(ObjRef::type_name)
            .and_then(|type_name| reader.registry().read_hook(&type_name));
        let resolved = match hook {
            Some(hook) => hook(substitute),
            None => substitute,
        };

        reader.identities().complete(record.id, resolved)
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::{
        CodecRegistry, CollectingSink, GraphReader, GraphWriter, Substitution, ValueKind,
    };
    use crate::graph::{ObjRef, ServiceRegistry, Value};

    fn version_registry() -> CodecRegistry {
        let mut registry = CodecRegistry::new();
        registry
            .substitution(
                "Version",
                Substitution::new().on_write(|obj| {
                    let text = obj.get("text").unwrap_or(Value::Null);
                    Value::Object(ObjRef::record("VersionText", [("text", text)]))
                }),
            )
            .substitution(
                "VersionText",
                Substitution::new().on_read(|substitute| {
                    let text = substitute
                        .as_object()
                        .and_then(|obj| obj.get("text"))
                        .unwrap_or(Value::Null);
                    Value::Object(ObjRef::record("Version", [("text", text)]))
                }),
            );
        registry
    }

    #[test]
    fn test_substitute_is_encoded_and_resolved() {
        let registry = version_registry();
        let sink = CollectingSink::new();
        let version = ObjRef::record("Version", [("text", Value::str("8.4"))]);
        let root = Value::Object(ObjRef::list(vec![
            Value::Object(version.clone()),
            Value::Object(version),
        ]));

        let encoded = GraphWriter::new(&registry, &sink).write(&root);
        let kinds: Vec<ValueKind> = encoded.records().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ValueKind::List, ValueKind::Substituted, ValueKind::Record]
        );

        let services = ServiceRegistry::new();
        let decoded = GraphReader::new(&registry, &services).read(&encoded).unwrap();
        let list = decoded.as_object().unwrap().clone();
        let node = list.borrow();
        let crate::graph::Node::Container(container) = &*node else {
            panic!("expected list");
        };
        let first = container.items()[0].as_object().unwrap();
        let second = container.items()[1].as_object().unwrap();
        assert_eq!(first.type_name().as_deref(), Some("Version"));
        assert_eq!(first.get("text"), Some(Value::str("8.4")));
        assert!(first.ptr_eq(second));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_hook_returning_its_input_keeps_the_object() {
        let mut registry = CodecRegistry::new();
        registry.substitution(
            "Version",
            Substitution::new().on_write(|obj| Value::Object(obj.clone())),
        );
        let sink = CollectingSink::new();
        let version = ObjRef::record("Version", [("text", Value::str("8.4"))]);
        let root = Value::Object(ObjRef::list(vec![
            Value::Object(version.clone()),
            Value::Object(version),
        ]));

        let encoded = GraphWriter::new(&registry, &sink).write(&root);
        assert_eq!(encoded.records()[1].kind, ValueKind::Record);

        let services = ServiceRegistry::new();
        let decoded = GraphReader::new(&registry, &services).read(&encoded).unwrap();
        let list = decoded.as_object().unwrap().clone();
        let node = list.borrow();
        let crate::graph::Node::Container(container) = &*node else {
            panic!("expected list");
        };
        let first = container.items()[0].as_object().unwrap();
        assert!(!first.is_pending());
        assert_eq!(first.type_name().as_deref(), Some("Version"));
        assert_eq!(first.get("text"), Some(Value::str("8.4")));
        assert!(first.ptr_eq(container.items()[1].as_object().unwrap()));
    }

    #[test]
    fn test_substitute_without_read_hook_is_kept() {
        let mut registry = CodecRegistry::new();
        registry.substitution(
            "Secret",
            Substitution::new().on_write(|_| Value::str("redacted")),
        );
        let sink = CollectingSink::new();
        let root = Value::Object(ObjRef::record("Secret", [("value", Value::str("hunter2"))]));

        let encoded = GraphWriter::new(&registry, &sink).write(&root);
        let services = ServiceRegistry::new();
        let decoded = GraphReader::new(&registry, &services).read(&encoded).unwrap();
        assert_eq!(decoded, Value::str("redacted"));
    }
}
