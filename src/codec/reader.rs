//! Graph reader
//!
//! Every record gets a forward handle before anything is decoded. Records are then
//! decoded in dependency order: each one after the records it refers to, except where a
//! reference closes a cycle, in which case it resolves to the forward handle that the
//! target fills in later. The order is computed with an explicit stack.

use tracing::debug;

use super::identity::ReadIdentities;
use super::kinds::scalar;
use super::registry::CodecRegistry;
use super::{DecodeError, EncodedGraph, EncodedRecord, EncodedValue, ValueKind};
use crate::graph::{ServiceLocator, Value};
use crate::logging::operations;

pub struct GraphReader<'a> {
    registry: &'a CodecRegistry,
    locator: &'a dyn ServiceLocator,
    identities: ReadIdentities,
}

impl<'a> GraphReader<'a> {
    pub fn new(registry: &'a CodecRegistry, locator: &'a dyn ServiceLocator) -> Self {
        Self {
            registry,
            locator,
            identities: ReadIdentities::new(),
        }
    }

    /// Materialize the graph. Consumes the reader; the result is only safe to share
    /// once this returns.
    pub fn read(mut self, graph: &EncodedGraph) -> Result<Value, DecodeError> {
        let records = graph.records();
        for (index, record) in records.iter().enumerate() {
            if record.id as usize != index {
                return Err(DecodeError::UnexpectedId {
                    expected: index as u32,
                    found: record.id,
                });
            }
        }

        self.identities.allocate(records.len());
        for index in decode_order(records)? {
            self.read_record(&records[index])?;
        }
        self.identities.verify_complete()?;

        let root = self.read_value(&graph.root)?;
        debug!(
            operation = operations::DECODE,
            records = records.len(),
            "graph decoded"
        );
        Ok(root)
    }

    pub fn registry(&self) -> &'a CodecRegistry {
        self.registry
    }

    pub fn locator(&self) -> &'a dyn ServiceLocator {
        self.locator
    }

    pub fn identities(&mut self) -> &mut ReadIdentities {
        &mut self.identities
    }

    pub fn read_value(&mut self, value: &EncodedValue) -> Result<Value, DecodeError> {
        match value {
            EncodedValue::Ref(id) => self.identities.get(*id),
            inline => match scalar::decode(self.registry, inline) {
                Some(decoded) => decoded,
                None => Err(DecodeError::UnexpectedKind(ValueKind::Null)),
            },
        }
    }

    fn read_record(&mut self, record: &EncodedRecord) -> Result<(), DecodeError> {
        let registry = self.registry;
        let codec = registry
            .codec_for(record.kind)
            .ok_or(DecodeError::UnexpectedKind(record.kind))?;
        codec.decode(self, record)?;
        if !self.identities.is_complete(record.id) {
            return Err(record.malformed("identity slot left incomplete"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Open,
    Done,
}

/// Post-order over the reference graph, following references in field order.
/// A reference to an `Open` record is a cycle and does not constrain the order.
fn decode_order(records: &[EncodedRecord]) -> Result<Vec<usize>, DecodeError> {
    let mut state = vec![Visit::New; records.len()];
    let mut order = Vec::with_capacity(records.len());
    // (record index, next field to look at)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..records.len() {
        if state[start] != Visit::New {
            continue;
        }
        state[start] = Visit::Open;
        stack.push((start, 0));

        while let Some((index, cursor)) = stack.last_mut() {
            let fields = &records[*index].fields;
            let mut child = None;
            while child.is_none() && *cursor < fields.len() {
                if let EncodedValue::Ref(id) = fields[*cursor].value {
                    match state.get(id as usize) {
                        Some(Visit::New) => child = Some(id as usize),
                        Some(_) => {}
                        None => return Err(DecodeError::UnknownReference(id)),
                    }
                }
                *cursor += 1;
            }

            match child {
                Some(target) => {
                    state[target] = Visit::Open;
                    stack.push((target, 0));
                }
                None => {
                    let done = *index;
                    stack.pop();
                    state[done] = Visit::Done;
                    order.push(done);
                }
            }
        }
    }
    Ok(order)
}
