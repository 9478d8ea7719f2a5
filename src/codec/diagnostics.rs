/// Diagnostics for references the codec refuses to persist
///
/// The writer reports at most one diagnostic per concrete type per walk. Where the
/// diagnostics end up is up to the embedding system.
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use tracing::warn;

use crate::logging::{operations, status};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    /// Concrete runtime type of the rejected object
    pub type_name: String,
    /// Capability the type was rejected through
    pub capability: String,
}

impl Diagnostic {
    pub fn new(type_name: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            capability: capability.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot persist object of type '{}' ({}); it is replaced by null",
            self.type_name, self.capability
        )
    }
}

pub trait DiagnosticSink {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Logs each diagnostic as a warning
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        warn!(
            operation = operations::ENCODE,
            status = status::PROBLEM,
            type_name = %diagnostic.type_name,
            capability = %diagnostic.capability,
            "{}",
            diagnostic
        );
    }
}

/// Keeps diagnostics in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    collected: RefCell<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.collected.borrow().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        self.collected.take()
    }

    pub fn len(&self) -> usize {
        self.collected.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.borrow().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.collected.borrow_mut().push(diagnostic.clone());
    }
}
