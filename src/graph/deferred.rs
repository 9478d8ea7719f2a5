use super::{EvalFailure, Node, ObjRef, Value};

/// Resolution state of a deferred value
#[derive(Clone, Debug)]
pub enum DeferredState {
    /// No value and no way to compute one
    Unset,
    /// Value is known
    Resolved(Value),
    /// Value comes from a supplier function, invoked on every read
    Supplied(ObjRef),
}

/// Lazily computed value.
///
/// Reading a supplied value invokes the supplier on the caller's thread; a failing
/// supplier surfaces its [`EvalFailure`] from [`Deferred::get`] and nowhere else.
#[derive(Clone, Debug)]
pub struct Deferred {
    state: DeferredState,
}

impl Deferred {
    pub fn unset() -> Self {
        Self {
            state: DeferredState::Unset,
        }
    }

    pub fn resolved(value: impl Into<Value>) -> Self {
        Self {
            state: DeferredState::Resolved(value.into()),
        }
    }

    pub fn supplied(supplier: super::CapturingFunction) -> Self {
        Self::from_supplier(ObjRef::function(supplier))
    }

    /// Supplier given as a function node, which may still be a forward handle
    pub fn from_supplier(supplier: ObjRef) -> Self {
        Self {
            state: DeferredState::Supplied(supplier),
        }
    }

    pub fn state(&self) -> &DeferredState {
        &self.state
    }

    pub fn set(&mut self, value: impl Into<Value>) {
        self.state = DeferredState::Resolved(value.into());
    }

    pub fn is_unset(&self) -> bool {
        matches!(self.state, DeferredState::Unset)
    }

    pub fn get(&self) -> Result<Option<Value>, EvalFailure> {
        match &self.state {
            DeferredState::Unset => Ok(None),
            DeferredState::Resolved(value) => Ok(Some(value.clone())),
            DeferredState::Supplied(supplier) => invoke_supplier(supplier).map(Some),
        }
    }
}

pub(crate) fn invoke_supplier(supplier: &ObjRef) -> Result<Value, EvalFailure> {
    // Clone out of the cell so the body may borrow any node, including this one.
    let function = match &*supplier.borrow() {
        Node::Function(function) => function.clone(),
        other => {
            return Err(EvalFailure::new(format!(
                "deferred value supplier is not a function ({})",
                other.describe()
            )))
        }
    };
    function.call(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FunctionTable;

    #[test]
    fn test_states() {
        assert_eq!(Deferred::unset().get().unwrap(), None);
        assert_eq!(
            Deferred::resolved(Value::Int(3)).get().unwrap(),
            Some(Value::Int(3))
        );
    }

    #[test]
    fn test_supplier_failure_surfaces_on_get() {
        let mut table = FunctionTable::new();
        table.register("read-version", |_, _| {
            Err(EvalFailure::new("version.txt not found"))
        });
        let deferred = Deferred::supplied(table.instantiate("read-version", None, vec![]).unwrap());

        let err = deferred.get().unwrap_err();
        assert_eq!(err.message(), "version.txt not found");
        // Every read re-invokes the supplier
        assert_eq!(deferred.get().unwrap_err(), err);
    }

    #[test]
    fn test_non_function_supplier() {
        let deferred = Deferred::from_supplier(ObjRef::pending());
        assert!(deferred.get().is_err());
    }
}
