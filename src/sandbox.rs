//! The sandbox policy hook.
//!
//! A [`SecurityPolicy`] vets attribute access, method calls and callables
//! during rendering.  Violations surface as errors of kind
//! [`SecurityError`](crate::ErrorKind::SecurityError).  The engine itself
//! additionally guards the `range()` builtin against runaway allocations
//! through [`set_max_range`](crate::Environment::set_max_range).
//!
//! ```
//! use std::sync::Arc;
//! use vinja::sandbox::DefaultSandbox;
//! use vinja::Environment;
//!
//! let mut env = Environment::new();
//! env.set_security_policy(Arc::new(DefaultSandbox));
//! ```
use crate::value::Value;

/// A predicate set consulted by the VM while rendering.
///
/// All methods default to permissive behavior so a policy only has to
/// implement the checks it cares about.
pub trait SecurityPolicy: Send + Sync {
    /// Whether an attribute of an object may be read.
    fn is_safe_attribute(&self, obj: &Value, name: &str) -> bool {
        let _ = (obj, name);
        true
    }

    /// Whether a value may be called.
    fn is_safe_callable(&self, callable: &Value) -> bool {
        let _ = callable;
        true
    }

    /// Whether a method call would modify a mutable container.
    ///
    /// This only matters for immutable sandbox variants; the default
    /// assumes methods do not mutate.
    fn modifies_mutable(&self, obj: &Value, method: &str) -> bool {
        let _ = (obj, method);
        false
    }
}

/// The default sandbox policy.
///
/// Refuses access to underscore prefixed attributes and methods, the
/// conventional marker for internals.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSandbox;

impl SecurityPolicy for DefaultSandbox {
    fn is_safe_attribute(&self, _obj: &Value, name: &str) -> bool {
        !name.starts_with('_')
    }
}

/// A sandbox policy that additionally rejects mutation.
///
/// On top of the [`DefaultSandbox`] rules, method names conventionally
/// associated with in-place mutation of containers are refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmutableSandbox;

const MUTATING_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "clear", "update", "setdefault", "popitem",
    "sort", "reverse", "add", "discard",
];

impl SecurityPolicy for ImmutableSandbox {
    fn is_safe_attribute(&self, _obj: &Value, name: &str) -> bool {
        !name.starts_with('_')
    }

    fn modifies_mutable(&self, _obj: &Value, method: &str) -> bool {
        MUTATING_METHODS.contains(&method)
    }
}
