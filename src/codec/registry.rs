//! Codec registry
//!
//! Classifies live values into a [`ValueKind`] and maps each record kind to the codec
//! that encodes and decodes it. Also holds the per-type knowledge the codecs need:
//! substitution hooks, enum declarations, function bodies and disallowed types.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::kinds::{self, ValueCodec};
use super::{DecodeError, ValueKind};
use crate::graph::{
    Captured, ContainerShape, EnumValue, EvalFailure, FunctionTable, Node, ObjRef, Value,
};

/// Capability reported for objects whose state cannot be enumerated at all
pub const UNSUPPORTED_CAPABILITY: &str = "unsupported type";

pub type WriteHook = Rc<dyn Fn(&ObjRef) -> Value>;
pub type ReadHook = Rc<dyn Fn(Value) -> Value>;

/// Type-declared substitution hooks
#[derive(Clone, Default)]
pub struct Substitution {
    write: Option<WriteHook>,
    read: Option<ReadHook>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the object persisted in place of a live instance
    pub fn on_write(mut self, hook: impl Fn(&ObjRef) -> Value + 'static) -> Self {
        self.write = Some(Rc::new(hook));
        self
    }

    /// Produce the final object from a decoded substitute
    pub fn on_read(mut self, hook: impl Fn(Value) -> Value + 'static) -> Self {
        self.read = Some(Rc::new(hook));
        self
    }
}

pub struct CodecRegistry {
    codecs: HashMap<ValueKind, Box<dyn ValueCodec>>,
    substitutions: HashMap<String, Substitution>,
    disallowed: HashMap<String, String>,
    enums: HashMap<String, Vec<String>>,
    functions: FunctionTable,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistry {
    /// Registry with a codec for every record kind
    pub fn new() -> Self {
        let mut codecs: HashMap<ValueKind, Box<dyn ValueCodec>> = HashMap::new();
        for shape in [
            ContainerShape::Array,
            ContainerShape::List,
            ContainerShape::Set,
            ContainerShape::SortedSet,
            ContainerShape::Map,
            ContainerShape::SortedMap,
        ] {
            codecs.insert(
                kinds::container::kind_of(shape),
                Box::new(kinds::container::ContainerCodec),
            );
        }
        codecs.insert(
            ValueKind::ImmutableContainer,
            Box::new(kinds::container::ImmutableCodec),
        );
        codecs.insert(
            ValueKind::Substituted,
            Box::new(kinds::substituted::SubstitutedCodec),
        );
        codecs.insert(
            ValueKind::CapturingFunction,
            Box::new(kinds::function::FunctionCodec),
        );
        codecs.insert(
            ValueKind::ServiceReference,
            Box::new(kinds::service::ServiceCodec),
        );
        codecs.insert(
            ValueKind::DeferredValue,
            Box::new(kinds::deferred::DeferredCodec),
        );
        codecs.insert(
            ValueKind::Disallowed,
            Box::new(kinds::disallowed::DisallowedCodec),
        );
        codecs.insert(ValueKind::Record, Box::new(kinds::record::RecordCodec));

        Self {
            codecs,
            substitutions: HashMap::new(),
            disallowed: HashMap::new(),
            enums: HashMap::new(),
            functions: FunctionTable::new(),
        }
    }

    /// Replace the codec used for a record kind
    pub fn register_codec(&mut self, kind: ValueKind, codec: Box<dyn ValueCodec>) -> &mut Self {
        self.codecs.insert(kind, codec);
        self
    }

    /// Never persist objects of `type_name`; report them under `capability`
    pub fn disallow(
        &mut self,
        type_name: impl Into<String>,
        capability: impl Into<String>,
    ) -> &mut Self {
        self.disallowed.insert(type_name.into(), capability.into());
        self
    }

    pub fn substitution(
        &mut self,
        type_name: impl Into<String>,
        substitution: Substitution,
    ) -> &mut Self {
        self.substitutions.insert(type_name.into(), substitution);
        self
    }

    /// Declare an enum's members in declaration order
    pub fn declare_enum<I, S>(&mut self, type_name: impl Into<String>, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enums.insert(
            type_name.into(),
            members.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn register_function<F>(&mut self, name: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&Captured<'_>, &[Value]) -> Result<Value, EvalFailure> + 'static,
    {
        self.functions.register(name, body);
        self
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Member of a declared enum, with its current ordinal
    pub fn enum_value(&self, type_name: &str, member: &str) -> Option<EnumValue> {
        let members = self.enums.get(type_name)?;
        let ordinal = members.iter().position(|m| m == member)?;
        Some(EnumValue::new(type_name, member, ordinal as u32))
    }

    pub fn is_disallowed(&self, type_name: &str) -> bool {
        self.disallowed.contains_key(type_name)
    }

    /// Kind of a live value. Total and deterministic; never fails.
    pub fn classify(&self, value: &Value) -> ValueKind {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Char(_)
            | Value::Str(_) => ValueKind::Primitive,
            Value::Enum(_) => ValueKind::Enum,
            Value::Object(obj) => self.classify_object(obj, true),
        }
    }

    /// Rule order: containers, substitution hook, function, service, deferred,
    /// disallowed type, plain record. Anything else cannot be enumerated and is
    /// handled as disallowed.
    pub(crate) fn classify_object(&self, obj: &ObjRef, allow_substitution: bool) -> ValueKind {
        let node = obj.borrow();
        match &*node {
            Node::Container(container) if container.immutable => ValueKind::ImmutableContainer,
            Node::Container(container) => kinds::container::kind_of(container.shape()),
            Node::Record(record)
                if allow_substitution && self.write_hook(&record.type_name).is_some() =>
            {
                ValueKind::Substituted
            }
            Node::Function(_) => ValueKind::CapturingFunction,
            Node::Service(_) => ValueKind::ServiceReference,
            Node::Deferred(_) => ValueKind::DeferredValue,
            Node::Record(record) if self.is_disallowed(&record.type_name) => ValueKind::Disallowed,
            Node::Record(_) => ValueKind::Record,
            Node::Opaque(_) | Node::Pending => ValueKind::Disallowed,
        }
    }

    /// Capability a disallowed object is reported under
    pub fn capability_of(&self, obj: &ObjRef) -> String {
        obj.type_name()
            .and_then(|type_name| self.disallowed.get(&type_name).cloned())
            .unwrap_or_else(|| UNSUPPORTED_CAPABILITY.to_string())
    }

    pub fn codec_for(&self, kind: ValueKind) -> Option<&dyn ValueCodec> {
        self.codecs.get(&kind).map(|codec| codec.as_ref())
    }

    pub(crate) fn write_hook(&self, type_name: &str) -> Option<WriteHook> {
        self.substitutions
            .get(type_name)
            .and_then(|substitution| substitution.write.clone())
    }

    pub(crate) fn read_hook(&self, type_name: &str) -> Option<ReadHook> {
        self.substitutions
            .get(type_name)
            .and_then(|substitution| substitution.read.clone())
    }

    /// Rebuild an enum value by type and member name; the ordinal is re-derived from
    /// the current declaration so reordered members still resolve.
    pub(crate) fn resolve_enum(
        &self,
        type_name: &str,
        member: &str,
        ordinal: u32,
    ) -> Result<EnumValue, DecodeError> {
        match self.enums.get(type_name) {
            Some(_) => {
                self.enum_value(type_name, member)
                    .ok_or_else(|| DecodeError::UnknownEnumMember {
                        type_name: type_name.to_string(),
                        member: member.to_string(),
                    })
            }
            None => Ok(EnumValue::new(type_name, member, ordinal)),
        }
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut substitutions: Vec<_> = self.substitutions.keys().collect();
        substitutions.sort();
        f.debug_struct("CodecRegistry")
            .field("kinds", &self.codecs.len())
            .field("substitutions", &substitutions)
            .field("disallowed", &self.disallowed)
            .field("enums", &self.enums)
            .field("functions", &self.functions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Container, Deferred, Elements, ServiceRegistry};

    #[test]
    fn test_scalars() {
        let registry = CodecRegistry::new();
        assert_eq!(registry.classify(&Value::Null), ValueKind::Null);
        assert_eq!(registry.classify(&Value::Int(1)), ValueKind::Primitive);
        assert_eq!(registry.classify(&Value::Char('x')), ValueKind::Primitive);
        assert_eq!(
            registry.classify(&Value::Enum(EnumValue::new("Mode", "Fast", 0))),
            ValueKind::Enum
        );
    }

    #[test]
    fn test_container_shapes_are_distinct() {
        let registry = CodecRegistry::new();
        let kind = |obj: ObjRef| registry.classify(&Value::Object(obj));

        assert_eq!(kind(ObjRef::array(vec![])), ValueKind::Array);
        assert_eq!(kind(ObjRef::list(vec![])), ValueKind::List);
        assert_eq!(kind(ObjRef::hash_set(vec![])), ValueKind::Set);
        assert_eq!(kind(ObjRef::sorted_set(vec![])), ValueKind::SortedSet);
        assert_eq!(kind(ObjRef::map(vec![])), ValueKind::Map);
        assert_eq!(kind(ObjRef::sorted_map(vec![])), ValueKind::SortedMap);

        let frozen = Container::new(Elements::List(vec![])).frozen();
        assert_eq!(
            kind(ObjRef::new(Node::Container(frozen))),
            ValueKind::ImmutableContainer
        );
    }

    #[test]
    fn test_substitution_wins_over_disallowed() {
        let mut registry = CodecRegistry::new();
        registry
            .disallow("Settings", "Settings")
            .substitution("Settings", Substitution::new().on_write(|_| Value::Null));

        let settings = ObjRef::record("Settings", Vec::<(String, Value)>::new());
        assert_eq!(
            registry.classify(&Value::Object(settings.clone())),
            ValueKind::Substituted
        );
        assert_eq!(
            registry.classify_object(&settings, false),
            ValueKind::Disallowed
        );
    }

    #[test]
    fn test_special_nodes() {
        let mut registry = CodecRegistry::new();
        registry.register_function("noop", |_, _| Ok(Value::Null));
        let mut services = ServiceRegistry::new();
        let service = services.register("hasher", ());

        let function = registry.functions().instantiate("noop", None, vec![]).unwrap();
        assert_eq!(
            registry.classify(&Value::Object(ObjRef::function(function))),
            ValueKind::CapturingFunction
        );
        assert_eq!(
            registry.classify(&Value::Object(service)),
            ValueKind::ServiceReference
        );
        assert_eq!(
            registry.classify(&Value::Object(ObjRef::deferred(Deferred::unset()))),
            ValueKind::DeferredValue
        );
    }

    #[test]
    fn test_disallowed_and_unsupported() {
        let mut registry = CodecRegistry::new();
        registry.disallow("DefaultProject", "Project");

        let project = ObjRef::record("DefaultProject", Vec::<(String, Value)>::new());
        assert_eq!(
            registry.classify(&Value::Object(project.clone())),
            ValueKind::Disallowed
        );
        assert_eq!(registry.capability_of(&project), "Project");

        let thread = ObjRef::opaque("Thread");
        assert_eq!(
            registry.classify(&Value::Object(thread.clone())),
            ValueKind::Disallowed
        );
        assert_eq!(registry.capability_of(&thread), UNSUPPORTED_CAPABILITY);

        let plain = ObjRef::record("Dependency", Vec::<(String, Value)>::new());
        assert_eq!(registry.classify(&Value::Object(plain)), ValueKind::Record);
    }

    #[test]
    fn test_enum_resolution_by_member_name() {
        let mut registry = CodecRegistry::new();
        registry.declare_enum("Level", ["Low", "Medium", "High"]);

        // Ordinal recorded under an older declaration order
        let resolved = registry.resolve_enum("Level", "High", 0).unwrap();
        assert_eq!(resolved.ordinal, 2);

        assert!(matches!(
            registry.resolve_enum("Level", "Extreme", 3),
            Err(DecodeError::UnknownEnumMember { .. })
        ));

        let undeclared = registry.resolve_enum("Other", "X", 4).unwrap();
        assert_eq!(undeclared.ordinal, 4);
    }

    #[test]
    fn test_every_record_kind_has_a_codec() {
        let registry = CodecRegistry::new();
        for kind in ValueKind::ALL {
            assert_eq!(registry.codec_for(kind).is_some(), !kind.is_scalar());
        }
    }
}
