use std::fmt;

use crate::error::{Error, ErrorKind};
use crate::value::Value;
use crate::vm::State;

/// A trait for custom dynamic values.
///
/// This is the vtable behind the `custom` value kind.  Implementations can
/// expose attributes, items and methods to templates, control their own
/// truthiness and participate in iteration.  All methods have sensible
/// defaults so that simple objects only implement what they need.
///
/// ```
/// use std::fmt;
/// use vinja::value::{Object, Value};
///
/// #[derive(Debug)]
/// struct Point {
///     x: f64,
///     y: f64,
/// }
///
/// impl Object for Point {
///     fn type_name(&self) -> &'static str {
///         "point"
///     }
///
///     fn get_attr(&self, name: &str) -> Option<Value> {
///         match name {
///             "x" => Some(Value::from(self.x)),
///             "y" => Some(Value::from(self.y)),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Object: fmt::Debug + Send + Sync {
    /// The name of the object type shown in error messages.
    fn type_name(&self) -> &'static str {
        "object"
    }

    /// Looks up an attribute by name.
    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Looks up an item by key.
    ///
    /// The default forwards string keys to [`get_attr`](Self::get_attr).
    fn get_item(&self, key: &Value) -> Option<Value> {
        self.get_attr(some!(key.as_str()))
    }

    /// Assigns an attribute.
    ///
    /// Most objects are read only from templates; the namespace object is
    /// the notable exception.
    fn set_attr(&self, _name: &str, _value: Value) -> Result<(), Error> {
        Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot assign attributes to {}", self.type_name()),
        ))
    }

    /// Calls the object.
    fn call(&self, _state: &State, _args: &[Value]) -> Result<Value, Error> {
        Err(Error::new(
            ErrorKind::TypeError,
            format!("{} is not callable", self.type_name()),
        ))
    }

    /// Calls a method on the object.
    ///
    /// The default looks up the attribute and calls it.
    fn call_method(&self, state: &State, name: &str, args: &[Value]) -> Result<Value, Error> {
        match self.get_attr(name) {
            Some(func) => func.call(state, args),
            None => Err(Error::new(
                ErrorKind::AttributeError,
                format!("{} has no method named {}", self.type_name(), name),
            )),
        }
    }

    /// The length of the object if it has one.
    fn len(&self) -> Option<usize> {
        None
    }

    /// Enumerates the object for iteration.
    ///
    /// Returning `None` makes the object non iterable.
    fn enumerate(&self) -> Option<Vec<Value>> {
        None
    }

    /// The truthiness of the object.
    ///
    /// Objects with a length are truthy when non empty, everything else
    /// is truthy.
    fn is_true(&self) -> bool {
        self.len().map_or(true, |len| len != 0)
    }

    /// Renders the object to the given formatter.
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.type_name())
    }
}
