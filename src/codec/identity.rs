//! Identity tables
//!
//! Each table lives for exactly one graph walk. Ids are allocated densely from zero in
//! first-visit order, which is also the order of the record table.

use std::collections::HashMap;

use super::DecodeError;
use crate::graph::{Node, ObjRef, Value};

/// Encode side: live object -> id
#[derive(Default)]
pub struct WriteIdentities {
    ids: HashMap<usize, u32>,
    // Visited objects stay alive until the walk ends so their addresses are not reused
    // by temporaries such as substitution replacements.
    pinned: Vec<ObjRef>,
}

impl WriteIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the object's id and whether this is its first visit
    pub fn assign(&mut self, obj: &ObjRef) -> (u32, bool) {
        if let Some(id) = self.ids.get(&obj.addr()) {
            return (*id, false);
        }
        let id = self.pinned.len() as u32;
        self.ids.insert(obj.addr(), id);
        self.pinned.push(obj.clone());
        (id, true)
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }
}

enum Slot {
    /// Not decoded yet; the handle may already be referenced by other objects
    Reserved(ObjRef),
    Complete(Value),
}

/// Decode side: id -> materialized value
#[derive(Default)]
pub struct ReadIdentities {
    slots: Vec<Slot>,
}

impl ReadIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a forward handle for each of `count` records, replacing any earlier table
    pub fn allocate(&mut self, count: usize) {
        self.slots = (0..count)
            .map(|_| Slot::Reserved(ObjRef::pending()))
            .collect();
    }

    /// Forward handle of a record that is not decoded yet.
    /// References resolve to this handle until the slot is completed.
    pub fn reserve(&self, id: u32) -> Result<ObjRef, DecodeError> {
        self.reserved(id).cloned()
    }

    /// Resolve a reference. Succeeds for slots that are still being decoded.
    pub fn get(&self, id: u32) -> Result<Value, DecodeError> {
        match self.slots.get(id as usize) {
            Some(Slot::Reserved(handle)) => Ok(Value::Object(handle.clone())),
            Some(Slot::Complete(value)) => Ok(value.clone()),
            None => Err(DecodeError::UnknownReference(id)),
        }
    }

    /// Complete a reserved slot by filling its forward handle with `node`
    pub fn fill(&mut self, id: u32, node: Node) -> Result<ObjRef, DecodeError> {
        let handle = self.reserved(id)?.clone();
        handle.replace(node);
        self.slots[id as usize] = Slot::Complete(Value::Object(handle.clone()));
        Ok(handle)
    }

    /// Complete a reserved slot with a value produced elsewhere (a resolved substitute,
    /// a located service, a null placeholder).
    ///
    /// If the forward handle was already handed out to a reference, the value must be a
    /// resolved object; its node is copied into the handle so earlier references observe
    /// it. A slot can never resolve to its own forward handle.
    pub fn complete(&mut self, id: u32, value: Value) -> Result<Value, DecodeError> {
        let handle = self.reserved(id)?.clone();
        if matches!(&value, Value::Object(obj) if obj.ptr_eq(&handle)) {
            return Err(DecodeError::UnresolvedForwardReference(id));
        }
        // One handle is held by the slot, one by us.
        let handed_out = handle.handle_count() > 2;
        let value = if handed_out {
            match value {
                Value::Object(obj) if !obj.is_pending() => {
                    let node = obj.borrow().clone();
                    handle.replace(node);
                    Value::Object(handle)
                }
                _ => return Err(DecodeError::UnresolvedForwardReference(id)),
            }
        } else {
            value
        };
        self.slots[id as usize] = Slot::Complete(value.clone());
        Ok(value)
    }

    pub fn is_complete(&self, id: u32) -> bool {
        matches!(self.slots.get(id as usize), Some(Slot::Complete(_)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fails if any slot was never completed
    pub fn verify_complete(&self) -> Result<(), DecodeError> {
        match self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Reserved(_)))
        {
            Some(id) => Err(DecodeError::UnresolvedForwardReference(id as u32)),
            None => Ok(()),
        }
    }

    fn reserved(&self, id: u32) -> Result<&ObjRef, DecodeError> {
        match self.slots.get(id as usize) {
            Some(Slot::Reserved(handle)) => Ok(handle),
            Some(Slot::Complete(_)) => Err(DecodeError::AlreadyDecoded(id)),
            None => Err(DecodeError::UnknownReference(id)),
        }
    }
}
