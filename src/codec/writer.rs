//! Graph writer
//!
//! Breadth-first walk from the root driven by a work queue. Every object goes through
//! [`WriteIdentities::assign`] when it is first referenced and is queued once; codecs
//! only ever emit references to ids, so encoding never recurses on the depth of the
//! graph and terminates on any finite graph, cyclic or not.

use std::collections::{HashSet, VecDeque};
use tracing::debug;

use super::diagnostics::{Diagnostic, DiagnosticSink};
use super::identity::WriteIdentities;
use super::kinds::{disallowed::DisallowedCodec, scalar, RecordBuilder, ValueCodec};
use super::registry::CodecRegistry;
use super::{EncodedGraph, EncodedRecord, EncodedValue, ValueKind};
use crate::graph::{ObjRef, Value};
use crate::logging::operations;

/// Object waiting for its record body
struct Queued {
    id: u32,
    obj: ObjRef,
    allow_substitution: bool,
}

pub struct GraphWriter<'a> {
    registry: &'a CodecRegistry,
    sink: &'a dyn DiagnosticSink,
    identities: WriteIdentities,
    queue: VecDeque<Queued>,
    reported: HashSet<String>,
}

impl<'a> GraphWriter<'a> {
    pub fn new(registry: &'a CodecRegistry, sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            registry,
            sink,
            identities: WriteIdentities::new(),
            queue: VecDeque::new(),
            reported: HashSet::new(),
        }
    }

    /// Encode the graph reachable from `root`. Consumes the writer: identities never
    /// leak from one walk into another.
    pub fn write(mut self, root: &Value) -> EncodedGraph {
        let root = self.write_value(root);

        // Ids are handed out in queue order, so records land at their own index.
        let mut records = Vec::new();
        while let Some(next) = self.queue.pop_front() {
            let mut out = RecordBuilder::new();
            let kind = self.encode_body(&next.obj, next.allow_substitution, &mut out);
            records.push(EncodedRecord {
                id: next.id,
                kind,
                type_name: out.type_name,
                fields: out.fields,
            });
        }

        debug!(
            operation = operations::ENCODE,
            records = records.len(),
            problems = self.reported.len(),
            "graph encoded"
        );
        EncodedGraph::new(root, records)
    }

    pub fn registry(&self) -> &'a CodecRegistry {
        self.registry
    }

    /// Encode a nested value through the generic dispatch
    pub fn write_value(&mut self, value: &Value) -> EncodedValue {
        self.write_with(value, true)
    }

    /// Encode the replacement produced by a substitution hook. The replacement object
    /// itself is not substituted again; its own fields are.
    pub fn write_replacement(&mut self, value: &Value) -> EncodedValue {
        self.write_with(value, false)
    }

    fn write_with(&mut self, value: &Value, allow_substitution: bool) -> EncodedValue {
        match value {
            Value::Object(obj) => {
                let (id, is_new) = self.identities.assign(obj);
                if is_new {
                    self.queue.push_back(Queued {
                        id,
                        obj: obj.clone(),
                        allow_substitution,
                    });
                }
                EncodedValue::Ref(id)
            }
            scalar_value => scalar::encode(scalar_value).unwrap_or(EncodedValue::Null),
        }
    }

    /// Classify `obj` and write its body into `out`, returning the kind it was written as
    pub(crate) fn encode_body(
        &mut self,
        obj: &ObjRef,
        allow_substitution: bool,
        out: &mut RecordBuilder,
    ) -> ValueKind {
        let registry = self.registry;
        let kind = registry.classify_object(obj, allow_substitution);
        let (kind, codec): (ValueKind, &dyn ValueCodec) = match registry.codec_for(kind) {
            Some(codec) => (kind, codec),
            None => (ValueKind::Disallowed, &DisallowedCodec),
        };
        codec.encode(self, obj, out);
        out.kind.unwrap_or(kind)
    }

    /// Report a rejected object, once per concrete type per walk
    pub(crate) fn report(&mut self, type_name: &str, capability: &str) {
        if self.reported.insert(type_name.to_string()) {
            self.sink.report(&Diagnostic::new(type_name, capability));
        }
    }
}
