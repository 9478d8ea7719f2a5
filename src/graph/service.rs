//! Process-wide service handles
//!
//! Services are never persisted. A graph stores only the [`ServiceToken`] naming the
//! capability; the reader asks a [`ServiceLocator`] for the live instance.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::{Node, ObjRef};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceToken(String);

impl ServiceToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A service instance together with the token it is registered under
#[derive(Clone)]
pub struct ServiceRef {
    token: ServiceToken,
    instance: Rc<dyn Any>,
}

impl ServiceRef {
    pub fn new<T: Any>(token: ServiceToken, instance: T) -> Self {
        Self {
            token,
            instance: Rc::new(instance),
        }
    }

    pub fn token(&self) -> &ServiceToken {
        &self.token
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.instance.downcast_ref::<T>()
    }
}

impl fmt::Debug for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRef")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Resolves service tokens to live instances
pub trait ServiceLocator {
    fn resolve(&self, token: &ServiceToken) -> Option<ObjRef>;
}

/// Locator backed by a map of singletons
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<ServiceToken, ObjRef>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a singleton and return the node graphs should reference it through.
    /// Registering the same token again replaces the singleton.
    pub fn register<T: Any>(&mut self, token: impl Into<String>, instance: T) -> ObjRef {
        let token = ServiceToken::new(token);
        let node = ObjRef::new(Node::Service(ServiceRef::new(token.clone(), instance)));
        self.services.insert(token, node.clone());
        node
    }

    pub fn get(&self, token: &str) -> Option<ObjRef> {
        self.services.get(&ServiceToken::new(token)).cloned()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceLocator for ServiceRegistry {
    fn resolve(&self, token: &ServiceToken) -> Option<ObjRef> {
        self.services.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FileHasher {
        algorithm: &'static str,
    }

    #[test]
    fn test_registry_resolves_singleton() {
        let mut registry = ServiceRegistry::new();
        let node = registry.register("file-hasher", FileHasher { algorithm: "sha256" });

        let resolved = registry
            .resolve(&ServiceToken::new("file-hasher"))
            .unwrap();
        assert!(resolved.ptr_eq(&node));

        let borrowed = resolved.borrow();
        let Node::Service(service) = &*borrowed else {
            panic!("expected service node");
        };
        assert_eq!(service.downcast_ref::<FileHasher>().unwrap().algorithm, "sha256");
    }

    #[test]
    fn test_unknown_token() {
        let registry = ServiceRegistry::new();
        assert!(registry.resolve(&ServiceToken::new("missing")).is_none());
    }
}
