//! Live object graph model
//!
//! The evaluation side of a build produces a graph of [`Value`]s. Scalars are stored
//! inline; everything with identity lives behind an [`ObjRef`], a shared mutable node.
//! Identity is pointer identity: two `ObjRef`s are the same object only if they point to
//! the same allocation. The graph may be cyclic.

mod deferred;
mod function;
mod service;

pub(crate) use deferred::invoke_supplier;
pub use deferred::{Deferred, DeferredState};
pub use function::{Captured, CapturingFunction, EvalFailure, FunctionBody, FunctionTable};
pub use service::{ServiceLocator, ServiceRef, ServiceRegistry, ServiceToken};

use std::cell::{Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// A value reachable from the graph root
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    Enum(EnumValue),
    Object(ObjRef),
}

/// Enum member, identified by its declaring type and member name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub type_name: String,
    pub member: String,
    pub ordinal: u32,
}

impl EnumValue {
    pub fn new(type_name: impl Into<String>, member: impl Into<String>, ordinal: u32) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
            ordinal,
        }
    }
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Char(_) => 3,
            Value::Str(_) => 4,
            Value::Enum(_) => 5,
            Value::Object(_) => 6,
        }
    }

    /// Natural ordering used by sorted containers.
    ///
    /// Scalars are totally ordered (kind first, then value). Objects have no natural
    /// order and compare equal, so a stable sort keeps their relative position.
    pub fn natural_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Char(a), Value::Char(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Enum(a), Value::Enum(b)) => a
                .type_name
                .cmp(&b.type_name)
                .then(a.ordinal.cmp(&b.ordinal))
                .then_with(|| a.member.cmp(&b.member)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialEq for Value {
    /// Scalars compare by value, objects by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Value::Object(obj)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Value::Enum(e)
    }
}

/// Shared handle to an identity-bearing node
#[derive(Clone)]
pub struct ObjRef(Rc<RefCell<Node>>);

impl ObjRef {
    pub fn new(node: Node) -> Self {
        Self(Rc::new(RefCell::new(node)))
    }

    /// Forward handle whose node is filled in later
    pub fn pending() -> Self {
        Self::new(Node::Pending)
    }

    pub fn record<I, S>(type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Self::new(Node::Record(Record::new(type_name, fields)))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::new(Node::Container(Container::new(Elements::Array(items))))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::new(Node::Container(Container::new(Elements::List(items))))
    }

    pub fn hash_set(items: Vec<Value>) -> Self {
        Self::new(Node::Container(Container::from_shape(ContainerShape::Set, items)))
    }

    pub fn sorted_set(items: Vec<Value>) -> Self {
        Self::new(Node::Container(Container::from_shape(
            ContainerShape::SortedSet,
            items,
        )))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Self::new(Node::Container(Container::from_entries(
            ContainerShape::Map,
            entries,
        )))
    }

    pub fn sorted_map(entries: Vec<(Value, Value)>) -> Self {
        Self::new(Node::Container(Container::from_entries(
            ContainerShape::SortedMap,
            entries,
        )))
    }

    pub fn function(function: CapturingFunction) -> Self {
        Self::new(Node::Function(function))
    }

    pub fn deferred(deferred: Deferred) -> Self {
        Self::new(Node::Deferred(deferred))
    }

    pub fn opaque(type_name: impl Into<String>) -> Self {
        Self::new(Node::Opaque(Opaque {
            type_name: type_name.into(),
        }))
    }

    pub fn borrow(&self) -> Ref<'_, Node> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Node> {
        self.0.borrow_mut()
    }

    /// Replace the node, returning the previous one
    pub fn replace(&self, node: Node) -> Node {
        self.0.replace(node)
    }

    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared node, stable for as long as any handle is alive
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Number of live handles to this node
    pub(crate) fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.borrow(), Node::Pending)
    }

    /// Runtime type name of a record or opaque handle
    pub fn type_name(&self) -> Option<String> {
        match &*self.borrow() {
            Node::Record(record) => Some(record.type_name.clone()),
            Node::Opaque(opaque) => Some(opaque.type_name.clone()),
            _ => None,
        }
    }

    /// Read a record field. Returns `None` for missing fields and non-record nodes.
    pub fn get(&self, field: &str) -> Option<Value> {
        match &*self.borrow() {
            Node::Record(record) => record.get(field).cloned(),
            _ => None,
        }
    }

    /// Write a record field, appending it if it is not declared yet.
    /// Returns `false` if this node is not a record.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> bool {
        match &mut *self.borrow_mut() {
            Node::Record(record) => {
                record.set(field, value.into());
                true
            }
            _ => false,
        }
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjRef {}

impl Hash for ObjRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl Drop for ObjRef {
    // Dropping the last handle to a long chain must not recurse once per link.
    fn drop(&mut self) {
        let mut orphans = Vec::new();
        detach(self, &mut orphans);
        while let Some(orphan) = orphans.pop() {
            detach(&orphan, &mut orphans);
        }
    }
}

/// Empty the node behind `obj` if this is its last handle, queueing its children.
///
/// The queued clones keep every child alive while the node is dropped, so no child is
/// torn down from inside its parent's destructor.
fn detach(obj: &ObjRef, orphans: &mut Vec<ObjRef>) {
    if Rc::strong_count(&obj.0) != 1 {
        return;
    }
    let Ok(mut node) = obj.0.try_borrow_mut() else {
        return;
    };
    if matches!(*node, Node::Pending) {
        return;
    }
    orphans.extend(node.children());
    *node = Node::Pending;
}

impl fmt::Debug for ObjRef {
    // Shallow on purpose: graphs are cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(node) => write!(f, "ObjRef({:#x}, {})", self.addr(), node.describe()),
            Err(_) => write!(f, "ObjRef({:#x}, <borrowed>)", self.addr()),
        }
    }
}

/// Node behind an [`ObjRef`]
#[derive(Clone, Debug)]
pub enum Node {
    /// Forward handle allocated by the reader, not completed yet
    Pending,
    Record(Record),
    Container(Container),
    Function(CapturingFunction),
    Deferred(Deferred),
    Service(ServiceRef),
    Opaque(Opaque),
}

impl Node {
    /// Objects this node refers to directly, in field order
    pub fn children(&self) -> Vec<ObjRef> {
        fn objects<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<ObjRef> {
            values
                .into_iter()
                .filter_map(Value::as_object)
                .cloned()
                .collect()
        }

        match self {
            Node::Record(record) => objects(record.fields.iter().map(|(_, value)| value)),
            Node::Container(container) => {
                let mut children = objects(container.items());
                children.extend(objects(
                    container.entries().iter().flat_map(|(k, v)| [k, v]),
                ));
                children
            }
            Node::Function(function) => {
                objects(function.receiver().into_iter().chain(function.captures()))
            }
            Node::Deferred(deferred) => match deferred.state() {
                DeferredState::Resolved(value) => objects([value]),
                DeferredState::Supplied(supplier) => vec![supplier.clone()],
                DeferredState::Unset => Vec::new(),
            },
            Node::Pending | Node::Service(_) | Node::Opaque(_) => Vec::new(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Node::Pending => "pending".to_string(),
            Node::Record(record) => format!("record {}", record.type_name),
            Node::Container(container) => {
                format!("{} of {}", container.shape().as_str(), container.len())
            }
            Node::Function(function) => format!("function {}", function.name()),
            Node::Deferred(_) => "deferred".to_string(),
            Node::Service(service) => format!("service {}", service.token()),
            Node::Opaque(opaque) => format!("opaque {}", opaque.type_name),
        }
    }
}

/// Plain object: a runtime type name plus its declared state in declaration order
#[derive(Clone, Debug)]
pub struct Record {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new<I, S>(type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((field.to_string(), value)),
        }
    }
}

/// Live handle with no enumerable state (thread, socket, session object, ...)
#[derive(Clone, Debug)]
pub struct Opaque {
    pub type_name: String,
}

/// Container shapes the codec distinguishes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerShape {
    Array,
    List,
    Set,
    SortedSet,
    Map,
    SortedMap,
}

impl ContainerShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerShape::Array => "array",
            ContainerShape::List => "list",
            ContainerShape::Set => "set",
            ContainerShape::SortedSet => "sorted_set",
            ContainerShape::Map => "map",
            ContainerShape::SortedMap => "sorted_map",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "array" => Some(ContainerShape::Array),
            "list" => Some(ContainerShape::List),
            "set" => Some(ContainerShape::Set),
            "sorted_set" => Some(ContainerShape::SortedSet),
            "map" => Some(ContainerShape::Map),
            "sorted_map" => Some(ContainerShape::SortedMap),
            _ => None,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, ContainerShape::Map | ContainerShape::SortedMap)
    }
}

/// Container contents. Sets never hold duplicates; sorted variants stay in natural order.
#[derive(Clone, Debug)]
pub enum Elements {
    Array(Vec<Value>),
    List(Vec<Value>),
    Set(Vec<Value>),
    SortedSet(Vec<Value>),
    Map(Vec<(Value, Value)>),
    SortedMap(Vec<(Value, Value)>),
}

#[derive(Clone, Debug)]
pub struct Container {
    pub elements: Elements,
    pub immutable: bool,
}

impl Container {
    pub fn new(elements: Elements) -> Self {
        Self {
            elements,
            immutable: false,
        }
    }

    /// Build a sequence-shaped container, enforcing set uniqueness and sort order.
    /// Map shapes get an empty container.
    pub fn from_shape(shape: ContainerShape, items: Vec<Value>) -> Self {
        let elements = match shape {
            ContainerShape::Array => return Self::new(Elements::Array(items)),
            ContainerShape::List => return Self::new(Elements::List(items)),
            ContainerShape::Set => Elements::Set(Vec::new()),
            ContainerShape::SortedSet => Elements::SortedSet(Vec::new()),
            ContainerShape::Map => return Self::new(Elements::Map(Vec::new())),
            ContainerShape::SortedMap => return Self::new(Elements::SortedMap(Vec::new())),
        };
        let mut container = Self::new(elements);
        for item in items {
            container.insert(item);
        }
        container
    }

    /// Build a map-shaped container; later duplicate keys overwrite earlier ones.
    pub fn from_entries(shape: ContainerShape, entries: Vec<(Value, Value)>) -> Self {
        let mut container = Self::new(if shape == ContainerShape::SortedMap {
            Elements::SortedMap(Vec::new())
        } else {
            Elements::Map(Vec::new())
        });
        for (key, value) in entries {
            container.put(key, value);
        }
        container
    }

    pub fn frozen(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn shape(&self) -> ContainerShape {
        match &self.elements {
            Elements::Array(_) => ContainerShape::Array,
            Elements::List(_) => ContainerShape::List,
            Elements::Set(_) => ContainerShape::Set,
            Elements::SortedSet(_) => ContainerShape::SortedSet,
            Elements::Map(_) => ContainerShape::Map,
            Elements::SortedMap(_) => ContainerShape::SortedMap,
        }
    }

    pub fn len(&self) -> usize {
        match &self.elements {
            Elements::Array(items)
            | Elements::List(items)
            | Elements::Set(items)
            | Elements::SortedSet(items) => items.len(),
            Elements::Map(entries) | Elements::SortedMap(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence elements in iteration order (empty for maps)
    pub fn items(&self) -> &[Value] {
        match &self.elements {
            Elements::Array(items)
            | Elements::List(items)
            | Elements::Set(items)
            | Elements::SortedSet(items) => items,
            Elements::Map(_) | Elements::SortedMap(_) => &[],
        }
    }

    /// Map entries in iteration order (empty for sequences)
    pub fn entries(&self) -> &[(Value, Value)] {
        match &self.elements {
            Elements::Map(entries) | Elements::SortedMap(entries) => entries,
            _ => &[],
        }
    }

    /// Add an element. Returns `false` if a set already contains it or this is a map.
    pub fn insert(&mut self, value: Value) -> bool {
        match &mut self.elements {
            Elements::Array(items) | Elements::List(items) => {
                items.push(value);
                true
            }
            Elements::Set(items) => {
                if items.contains(&value) {
                    return false;
                }
                items.push(value);
                true
            }
            Elements::SortedSet(items) => {
                if items.contains(&value) {
                    return false;
                }
                let at = items.partition_point(|probe| probe.natural_cmp(&value).is_le());
                items.insert(at, value);
                true
            }
            Elements::Map(_) | Elements::SortedMap(_) => false,
        }
    }

    /// Associate `key` with `value`, returning the previous value.
    pub fn put(&mut self, key: Value, value: Value) -> Option<Value> {
        let sorted = matches!(self.elements, Elements::SortedMap(_));
        let entries = match &mut self.elements {
            Elements::Map(entries) | Elements::SortedMap(entries) => entries,
            _ => return None,
        };
        if let Some((_, slot)) = entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(slot, value));
        }
        if sorted {
            let at = entries.partition_point(|(probe, _)| probe.natural_cmp(&key).is_le());
            entries.insert(at, (key, value));
        } else {
            entries.push((key, value));
        }
        None
    }

    pub fn lookup(&self, key: &Value) -> Option<&Value> {
        self.entries()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// Compare two graphs field by field.
///
/// Objects are matched structurally rather than by identity; revisiting a pair that is
/// already being compared counts as equal, so cyclic graphs terminate. The walk keeps
/// its own work list and does not recurse on depth.
pub fn structurally_equal(a: &Value, b: &Value) -> bool {
    let mut assumed = HashSet::new();
    let mut pending = vec![(a.clone(), b.clone())];

    while let Some((a, b)) = pending.pop() {
        match (&a, &b) {
            (Value::Object(x), Value::Object(y)) => {
                if !assumed.insert((x.addr(), y.addr())) {
                    continue;
                }
                let (x, y) = (x.borrow(), y.borrow());
                if !nodes_match(&x, &y, &mut pending) {
                    return false;
                }
            }
            _ if a != b => return false,
            _ => {}
        }
    }
    true
}

fn pair_up(a: &[Value], b: &[Value], pending: &mut Vec<(Value, Value)>) -> bool {
    if a.len() != b.len() {
        return false;
    }
    pending.extend(a.iter().cloned().zip(b.iter().cloned()));
    true
}

/// Compare the shallow parts of two nodes and queue their child pairs
fn nodes_match(a: &Node, b: &Node, pending: &mut Vec<(Value, Value)>) -> bool {
    match (a, b) {
        (Node::Pending, Node::Pending) => true,
        (Node::Record(x), Node::Record(y)) => {
            if x.type_name != y.type_name
                || x.fields.len() != y.fields.len()
                || x.fields.iter().zip(&y.fields).any(|((nx, _), (ny, _))| nx != ny)
            {
                return false;
            }
            for ((_, vx), (_, vy)) in x.fields.iter().zip(&y.fields) {
                pending.push((vx.clone(), vy.clone()));
            }
            true
        }
        (Node::Container(x), Node::Container(y)) => {
            if x.shape() != y.shape()
                || x.entries().len() != y.entries().len()
                || !pair_up(x.items(), y.items(), pending)
            {
                return false;
            }
            for ((kx, vx), (ky, vy)) in x.entries().iter().zip(y.entries()) {
                pending.push((kx.clone(), ky.clone()));
                pending.push((vx.clone(), vy.clone()));
            }
            true
        }
        (Node::Function(x), Node::Function(y)) => {
            if x.name() != y.name() {
                return false;
            }
            match (x.receiver(), y.receiver()) {
                (Some(rx), Some(ry)) => pending.push((rx.clone(), ry.clone())),
                (None, None) => {}
                _ => return false,
            }
            pair_up(x.captures(), y.captures(), pending)
        }
        (Node::Deferred(x), Node::Deferred(y)) => match (x.state(), y.state()) {
            (DeferredState::Unset, DeferredState::Unset) => true,
            (DeferredState::Resolved(vx), DeferredState::Resolved(vy)) => {
                pending.push((vx.clone(), vy.clone()));
                true
            }
            (DeferredState::Supplied(fx), DeferredState::Supplied(fy)) => {
                pending.push((Value::Object(fx.clone()), Value::Object(fy.clone())));
                true
            }
            _ => false,
        },
        (Node::Service(x), Node::Service(y)) => x.token() == y.token(),
        (Node::Opaque(x), Node::Opaque(y)) => x.type_name == y.type_name,
        _ => false,
    }
}
