/// Capturing function values
///
/// A function value is a named body plus the state it closed over: an optional receiver
/// (the enclosing object) and plain captured values. Bodies are registered by name in a
/// [`FunctionTable`] so a decoded function can be rebuilt around restored captures.
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use super::Value;

/// Failure raised by a function body when it is invoked
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EvalFailure {
    message: String,
}

impl EvalFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// State visible to a function body
pub struct Captured<'a> {
    receiver: Option<&'a Value>,
    values: &'a [Value],
}

impl<'a> Captured<'a> {
    pub fn receiver(&self) -> Option<&'a Value> {
        self.receiver
    }

    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

pub type FunctionBody = Rc<dyn Fn(&Captured<'_>, &[Value]) -> Result<Value, EvalFailure>>;

#[derive(Clone)]
pub struct CapturingFunction {
    name: String,
    body: FunctionBody,
    receiver: Option<Value>,
    captures: Vec<Value>,
}

impl CapturingFunction {
    pub fn new(
        name: impl Into<String>,
        body: FunctionBody,
        receiver: Option<Value>,
        captures: Vec<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            body,
            receiver,
            captures,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.receiver.as_ref()
    }

    pub fn captures(&self) -> &[Value] {
        &self.captures
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalFailure> {
        let captured = Captured {
            receiver: self.receiver.as_ref(),
            values: &self.captures,
        };
        (self.body)(&captured, args)
    }
}

impl fmt::Debug for CapturingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturingFunction")
            .field("name", &self.name)
            .field("receiver", &self.receiver)
            .field("captures", &self.captures)
            .finish_non_exhaustive()
    }
}

/// Function bodies by name
#[derive(Clone, Default)]
pub struct FunctionTable {
    bodies: HashMap<String, FunctionBody>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, body: F)
    where
        F: Fn(&Captured<'_>, &[Value]) -> Result<Value, EvalFailure> + 'static,
    {
        self.bodies.insert(name.into(), Rc::new(body));
    }

    pub fn body(&self, name: &str) -> Option<FunctionBody> {
        self.bodies.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bodies.contains_key(name)
    }

    /// Create a function value around a registered body
    pub fn instantiate(
        &self,
        name: &str,
        receiver: Option<Value>,
        captures: Vec<Value>,
    ) -> Option<CapturingFunction> {
        self.body(name)
            .map(|body| CapturingFunction::new(name, body, receiver, captures))
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.bodies.keys().collect();
        names.sort();
        f.debug_struct("FunctionTable")
            .field("bodies", &names)
            .finish()
    }
}
