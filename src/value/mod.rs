//! Provides a dynamic value type abstraction.
//!
//! This module gives access to the dynamically typed value which is used by
//! the template engine during execution.
//!
//! For the most part the existence of the value type can be ignored as the
//! engine performs the necessary conversions for you.  For instance if you
//! write a filter that converts a string you can directly declare the filter
//! to take a [`String`].  For some more advanced use cases it's useful to
//! know that this type exists.
//!
//! # Basic Value Conversions
//!
//! Values are typically created via the [`From`] trait:
//!
//! ```
//! # use vinja::value::Value;
//! let int_value = Value::from(42);
//! let none_value = Value::from(());
//! let true_value = Value::from(true);
//! ```
//!
//! The engine will usually create values via an indirection via [`serde`]
//! when a template is rendered.  This can also be triggered manually by
//! using the [`Value::from_serializable`] method.
//!
//! # Undefined Values
//!
//! The special [`undefined`](Value::UNDEFINED) value carries the name of the
//! variable that was missing and an [`UndefinedPolicy`] that decides how
//! operations on it behave.
//!
//! # Memory Management
//!
//! Values are immutable objects which are internally reference counted which
//! means they can be copied relatively cheaply.  Containers own their
//! elements; temporary values created during a render die with their last
//! reference when the render returns.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};

pub use crate::value::argtypes::{from_args, ArgType, FunctionArgs, FunctionResult, Rest};
pub use crate::value::callable::{Callable, CallableKind};
pub use crate::value::object::Object;

pub(crate) mod argtypes;
pub(crate) mod callable;
pub(crate) mod object;
pub(crate) mod ops;
mod serialize;

/// The insertion ordered map type backing dict values.
pub(crate) type ValueMap = indexmap::IndexMap<Arc<str>, Value>;

/// Describes the kind of value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[non_exhaustive]
pub enum ValueKind {
    /// The value is undefined.
    Undefined,
    /// The value is the none singleton.
    None,
    /// The value is a [`bool`].
    Bool,
    /// The value is a number (integer or float).
    Number,
    /// The value is a string or markup.
    String,
    /// The value is a list of other values.
    List,
    /// The value is an insertion ordered key/value mapping.
    Dict,
    /// The value is a callable (function, macro, filter or test).
    Callable,
    /// The value is a custom dynamic object.
    Custom,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Undefined => "undefined",
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Dict => "dict",
            ValueKind::Callable => "callable",
            ValueKind::Custom => "custom",
        })
    }
}

/// Defines the behavior of undefined values in the engine.
///
/// The policy travels on the undefined value itself so that chained
/// accesses keep their context across template boundaries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum UndefinedPolicy {
    /// Prints as an empty string, swallows attribute and method access.
    #[default]
    Lenient,
    /// The first use of the undefined value raises an error.
    Strict,
    /// Prints a human readable sentinel naming the missing variable.
    Debug,
    /// Undefined values propagate through attribute and subscript chains.
    Chainable,
}

/// Distinguishes regular dicts from keyword argument capsules.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum DictKind {
    /// A regular dict literal or mapping.
    Normal,
    /// A dict created to pass keyword arguments to a call.
    Kwargs,
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    None,
    Undefined(Option<Arc<str>>, UndefinedPolicy),
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    Markup(Arc<str>),
    List(Arc<Vec<Value>>),
    Dict(Arc<ValueMap>, DictKind),
    Callable(Arc<Callable>),
    Custom(Arc<dyn Object>),
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::None => f.write_str("none"),
            ValueRepr::Undefined(None, _) => f.write_str("undefined"),
            ValueRepr::Undefined(Some(name), _) => write!(f, "undefined({name})"),
            ValueRepr::Bool(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Int(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Float(val) => fmt::Debug::fmt(val, f),
            ValueRepr::String(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Markup(val) => write!(f, "markup({val:?})"),
            ValueRepr::List(val) => f.debug_list().entries(val.iter()).finish(),
            ValueRepr::Dict(val, _) => f.debug_map().entries(val.iter()).finish(),
            ValueRepr::Callable(val) => write!(f, "{val}"),
            ValueRepr::Custom(val) => write!(f, "<{}>", val.type_name()),
        }
    }
}

fn write_item(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match &value.0 {
        ValueRepr::String(s) | ValueRepr::Markup(s) => write!(f, "'{s}'"),
        _ => write!(f, "{value}"),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::None => f.write_str("none"),
            ValueRepr::Undefined(name, policy) => match policy {
                UndefinedPolicy::Debug => match name {
                    Some(name) => write!(f, "<undefined value: {name}>"),
                    None => f.write_str("<undefined value>"),
                },
                _ => Ok(()),
            },
            ValueRepr::Bool(val) => val.fmt(f),
            ValueRepr::Int(val) => val.fmt(f),
            ValueRepr::Float(val) => {
                if val.is_nan() {
                    f.write_str("NaN")
                } else if val.is_infinite() {
                    write!(f, "{}inf", if val.is_sign_negative() { "-" } else { "" })
                } else {
                    let mut num = val.to_string();
                    if !num.contains('.') && !num.contains('e') {
                        num.push_str(".0");
                    }
                    f.write_str(&num)
                }
            }
            ValueRepr::String(val) => f.write_str(val),
            ValueRepr::Markup(val) => f.write_str(val),
            ValueRepr::List(val) => {
                ok!(f.write_str("["));
                for (idx, item) in val.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write_item(f, item));
                }
                f.write_str("]")
            }
            ValueRepr::Dict(val, _) => {
                ok!(f.write_str("{"));
                for (idx, (key, value)) in val.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write!(f, "'{key}': "));
                    ok!(write_item(f, value));
                }
                f.write_str("}")
            }
            ValueRepr::Callable(val) => write!(f, "{val}"),
            ValueRepr::Custom(val) => val.render(f),
        }
    }
}

impl Default for Value {
    fn default() -> Value {
        Value(ValueRepr::Undefined(None, UndefinedPolicy::Lenient))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (ValueRepr::None, ValueRepr::None) => true,
            (ValueRepr::Undefined(..), ValueRepr::Undefined(..)) => true,
            (
                ValueRepr::String(a) | ValueRepr::Markup(a),
                ValueRepr::String(b) | ValueRepr::Markup(b),
            ) => a == b,
            (ValueRepr::List(a), ValueRepr::List(b)) => a == b,
            (ValueRepr::Dict(a, _), ValueRepr::Dict(b, _)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (ValueRepr::Callable(a), ValueRepr::Callable(b)) => Arc::ptr_eq(a, b),
            (ValueRepr::Custom(a), ValueRepr::Custom(b)) => Arc::ptr_eq(a, b),
            _ => match ops::coerce(self, other) {
                Some(ops::CoerceResult::F64(a, b)) => a == b,
                Some(ops::CoerceResult::I64(a, b)) => a == b,
                Some(ops::CoerceResult::Str(a, b)) => a == b,
                None => false,
            },
        }
    }
}

impl Eq for Value {}

fn f64_total_cmp(left: f64, right: f64) -> Ordering {
    let mut left = left.to_bits() as i64;
    let mut right = right.to_bits() as i64;
    left ^= (((left >> 63) as u64) >> 1) as i64;
    right ^= (((right >> 63) as u64) >> 1) as i64;
    left.cmp(&right)
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let value_ordering = match (&self.0, &other.0) {
            (ValueRepr::None, ValueRepr::None) => Ordering::Equal,
            (ValueRepr::Undefined(..), ValueRepr::Undefined(..)) => Ordering::Equal,
            (
                ValueRepr::String(a) | ValueRepr::Markup(a),
                ValueRepr::String(b) | ValueRepr::Markup(b),
            ) => a.cmp(b),
            (ValueRepr::List(a), ValueRepr::List(b)) => a.iter().cmp(b.iter()),
            (ValueRepr::Dict(a, _), ValueRepr::Dict(b, _)) => a.iter().cmp(b.iter()),
            _ => match ops::coerce(self, other) {
                Some(ops::CoerceResult::F64(a, b)) => f64_total_cmp(a, b),
                Some(ops::CoerceResult::I64(a, b)) => a.cmp(&b),
                Some(ops::CoerceResult::Str(a, b)) => a.cmp(b),
                None => Ordering::Equal,
            },
        };
        value_ordering.then((self.kind() as usize).cmp(&(other.kind() as usize)))
    }
}

#[allow(clippy::len_without_is_empty)]
impl Value {
    /// The undefined value.
    ///
    /// This constant exists because the undefined type does not exist in
    /// Rust and this is the only way to construct it directly.
    pub const UNDEFINED: Value = Value(ValueRepr::Undefined(None, UndefinedPolicy::Lenient));

    /// Creates an undefined value that remembers the missing name and the
    /// policy that governs operations on it.
    pub fn undefined_named(name: &str, policy: UndefinedPolicy) -> Value {
        Value(ValueRepr::Undefined(Some(Arc::from(name)), policy))
    }

    /// Creates a value from something that can be serialized.
    ///
    /// This is the method that the engine will use whenever a serializable
    /// object is passed to one of the APIs that internally want to create a
    /// value.  For instance this is what [`context!`](crate::context) and
    /// [`render`](crate::Template::render) will use.
    pub fn from_serializable<T: serde::Serialize>(value: &T) -> Value {
        serialize::transform(value)
    }

    /// Creates a value from a safe string.
    ///
    /// A safe string is one that will bypass auto escaping.  For instance if
    /// you want to have the template engine render some HTML without the
    /// user having to supply the `|safe` filter, you can use a value of this
    /// type instead.
    pub fn from_safe_string(value: String) -> Value {
        Value(ValueRepr::Markup(Arc::from(value)))
    }

    /// Creates a value from a custom dynamic object.
    pub fn from_object<T: Object + 'static>(value: T) -> Value {
        Value(ValueRepr::Custom(Arc::new(value)))
    }

    /// Creates a value from an already boxed dynamic object.
    pub fn from_dyn_object(value: Arc<dyn Object>) -> Value {
        Value(ValueRepr::Custom(value))
    }

    /// Creates a callable value from a native function.
    pub fn from_function<F>(name: &str, f: F) -> Value
    where
        F: Fn(&crate::vm::State, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Value(ValueRepr::Callable(Arc::new(Callable::new_native(
            name,
            CallableKind::Function,
            f,
        ))))
    }

    pub(crate) fn from_value_map(map: ValueMap) -> Value {
        Value(ValueRepr::Dict(Arc::new(map), DictKind::Normal))
    }

    pub(crate) fn from_kwargs(map: ValueMap) -> Value {
        Value(ValueRepr::Dict(Arc::new(map), DictKind::Kwargs))
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::None => ValueKind::None,
            ValueRepr::Undefined(..) => ValueKind::Undefined,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::Int(_) | ValueRepr::Float(_) => ValueKind::Number,
            ValueRepr::String(_) | ValueRepr::Markup(_) => ValueKind::String,
            ValueRepr::List(_) => ValueKind::List,
            ValueRepr::Dict(..) => ValueKind::Dict,
            ValueRepr::Callable(_) => ValueKind::Callable,
            ValueRepr::Custom(_) => ValueKind::Custom,
        }
    }

    /// Returns true if the value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self.0, ValueRepr::Undefined(..))
    }

    /// Returns true if the value is none.
    pub fn is_none(&self) -> bool {
        matches!(self.0, ValueRepr::None)
    }

    /// Returns true if the value is markup (safe from auto escaping).
    pub fn is_safe(&self) -> bool {
        matches!(self.0, ValueRepr::Markup(_))
    }

    /// Returns the undefined policy if the value is undefined.
    pub fn undefined_policy(&self) -> Option<UndefinedPolicy> {
        match self.0 {
            ValueRepr::Undefined(_, policy) => Some(policy),
            _ => None,
        }
    }

    /// Returns the name the undefined value was created for.
    pub fn undefined_name(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::Undefined(ref name, _) => name.as_deref(),
            _ => None,
        }
    }

    /// Is this value truthy?
    pub fn is_true(&self) -> bool {
        match self.0 {
            ValueRepr::None | ValueRepr::Undefined(..) => false,
            ValueRepr::Bool(val) => val,
            ValueRepr::Int(val) => val != 0,
            ValueRepr::Float(val) => val != 0.0,
            ValueRepr::String(ref val) | ValueRepr::Markup(ref val) => !val.is_empty(),
            ValueRepr::List(ref val) => !val.is_empty(),
            ValueRepr::Dict(ref val, _) => !val.is_empty(),
            ValueRepr::Callable(_) => true,
            ValueRepr::Custom(ref val) => val.is_true(),
        }
    }

    /// If the value is a string, return it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::String(ref val) | ValueRepr::Markup(ref val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a callable, return it.
    pub(crate) fn as_callable(&self) -> Option<&Arc<Callable>> {
        match self.0 {
            ValueRepr::Callable(ref val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a custom object, return it.
    pub fn as_object(&self) -> Option<&Arc<dyn Object>> {
        match self.0 {
            ValueRepr::Custom(ref val) => Some(val),
            _ => None,
        }
    }

    /// Returns the value as usize if it's representable.
    pub fn as_usize(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::Int(val) => usize::try_from(val).ok(),
            _ => None,
        }
    }

    /// Returns the length of the contained value.
    pub fn len(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::String(ref val) | ValueRepr::Markup(ref val) => {
                Some(val.chars().count())
            }
            ValueRepr::List(ref val) => Some(val.len()),
            ValueRepr::Dict(ref val, _) => Some(val.len()),
            ValueRepr::Custom(ref val) => val.len(),
            _ => None,
        }
    }

    /// Turns the value into a dict key.
    pub(crate) fn as_dict_key(&self) -> Arc<str> {
        match self.0 {
            ValueRepr::String(ref val) | ValueRepr::Markup(ref val) => val.clone(),
            _ => Arc::from(self.to_string()),
        }
    }

    /// Looks up an attribute by name.
    ///
    /// This is the fast path used by the VM that does not know about
    /// undefined policies; the caller handles missing attributes.
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match self.0 {
            ValueRepr::Dict(ref val, _) => val.get(name).cloned(),
            ValueRepr::Custom(ref val) => val.get_attr(name),
            _ => None,
        }
    }

    /// Looks up an item by value key.
    pub fn get_item(&self, key: &Value) -> Option<Value> {
        match self.0 {
            ValueRepr::Dict(ref val, _) => val.get(&key.as_dict_key() as &str).cloned(),
            ValueRepr::List(ref val) => {
                let idx = some!(index_for(key, val.len()));
                val.get(idx).cloned()
            }
            ValueRepr::String(ref val) | ValueRepr::Markup(ref val) => {
                let chars = val.chars().collect::<Vec<_>>();
                let idx = some!(index_for(key, chars.len()));
                chars.get(idx).map(|c| Value::from(c.to_string()))
            }
            ValueRepr::Custom(ref val) => val.get_item(key),
            _ => None,
        }
    }

    /// Iterates over the value.
    ///
    /// Lists iterate over their elements, dicts over their keys, strings
    /// over their characters.  Undefined values produce an empty iteration
    /// unless the policy is strict.
    pub fn try_iter(&self) -> Result<ValueIter, Error> {
        match self.0 {
            ValueRepr::None | ValueRepr::Undefined(..) => Ok(ValueIter::empty()),
            ValueRepr::List(ref val) => Ok(ValueIter {
                repr: ValueIterRepr::List(val.clone(), 0),
            }),
            ValueRepr::Dict(ref val, _) => Ok(ValueIter {
                repr: ValueIterRepr::Dict(val.clone(), 0),
            }),
            ValueRepr::String(ref val) | ValueRepr::Markup(ref val) => Ok(ValueIter {
                repr: ValueIterRepr::Owned(
                    val.chars()
                        .map(|c| Value::from(c.to_string()))
                        .collect::<Vec<_>>()
                        .into_iter(),
                ),
            }),
            ValueRepr::Custom(ref val) => match val.enumerate() {
                Some(items) => Ok(ValueIter {
                    repr: ValueIterRepr::Owned(items.into_iter()),
                }),
                None => Err(Error::new(
                    ErrorKind::TypeError,
                    format!("{} is not iterable", val.type_name()),
                )),
            },
            _ => Err(Error::new(
                ErrorKind::TypeError,
                format!("value of type {} is not iterable", self.kind()),
            )),
        }
    }

    /// Calls the value with the given arguments.
    pub fn call(&self, state: &crate::vm::State, args: &[Value]) -> Result<Value, Error> {
        match self.0 {
            ValueRepr::Callable(ref val) => val.call(state, args),
            ValueRepr::Custom(ref val) => val.call(state, args),
            _ => Err(Error::new(
                ErrorKind::TypeError,
                format!("value of type {} is not callable", self.kind()),
            )),
        }
    }

    /// Calls a method on the value.
    pub fn call_method(
        &self,
        state: &crate::vm::State,
        name: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match self.0 {
            ValueRepr::Custom(ref val) => val.call_method(state, name, args),
            ValueRepr::Dict(ref val, _) => match val.get(name) {
                Some(func) => func.call(state, args),
                None => Err(Error::new(
                    ErrorKind::AttributeError,
                    format!("dict has no method named {name}"),
                )),
            },
            _ => Err(Error::new(
                ErrorKind::AttributeError,
                format!("value of type {} has no method named {name}", self.kind()),
            )),
        }
    }

    /// If this is a kwargs capsule, return the map.
    pub(crate) fn as_kwargs(&self) -> Option<&Arc<ValueMap>> {
        match self.0 {
            ValueRepr::Dict(ref val, DictKind::Kwargs) => Some(val),
            _ => None,
        }
    }

    /// Returns the dict backing this value if it is one.
    pub(crate) fn as_dict(&self) -> Option<&Arc<ValueMap>> {
        match self.0 {
            ValueRepr::Dict(ref val, _) => Some(val),
            _ => None,
        }
    }

    /// Returns the list backing this value if it is one.
    pub(crate) fn as_list(&self) -> Option<&Arc<Vec<Value>>> {
        match self.0 {
            ValueRepr::List(ref val) => Some(val),
            _ => None,
        }
    }
}

fn index_for(key: &Value, len: usize) -> Option<usize> {
    match key.0 {
        ValueRepr::Int(idx) => {
            if idx < 0 {
                len.checked_sub(idx.unsigned_abs() as usize)
            } else {
                Some(idx as usize)
            }
        }
        _ => None,
    }
}

impl From<ValueRepr> for Value {
    #[inline(always)]
    fn from(val: ValueRepr) -> Value {
        Value(val)
    }
}

impl From<()> for Value {
    #[inline(always)]
    fn from(_: ()) -> Self {
        Value(ValueRepr::None)
    }
}

impl From<bool> for Value {
    #[inline(always)]
    fn from(val: bool) -> Self {
        Value(ValueRepr::Bool(val))
    }
}

impl From<f64> for Value {
    #[inline(always)]
    fn from(val: f64) -> Self {
        Value(ValueRepr::Float(val))
    }
}

impl From<f32> for Value {
    #[inline(always)]
    fn from(val: f32) -> Self {
        Value(ValueRepr::Float(val as f64))
    }
}

macro_rules! int_value_from {
    ($($src:ty)*) => {
        $(
            impl From<$src> for Value {
                #[inline(always)]
                fn from(val: $src) -> Self {
                    Value(ValueRepr::Int(val as i64))
                }
            }
        )*
    };
}

int_value_from!(u8 u16 u32 i8 i16 i32 i64 u64 usize);

impl From<&str> for Value {
    #[inline(always)]
    fn from(val: &str) -> Self {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl From<String> for Value {
    #[inline(always)]
    fn from(val: String) -> Self {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl From<&String> for Value {
    #[inline(always)]
    fn from(val: &String) -> Self {
        Value::from(val.as_str())
    }
}

impl From<Arc<str>> for Value {
    #[inline(always)]
    fn from(val: Arc<str>) -> Self {
        Value(ValueRepr::String(val))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        Value(ValueRepr::List(Arc::new(
            val.into_iter().map(Into::into).collect(),
        )))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => Value(ValueRepr::None),
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Value(ValueRepr::List(Arc::new(
            iter.into_iter().map(Into::into).collect(),
        )))
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Value::from_value_map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn unsupported_conversion(kind: ValueKind, target: &str) -> Error {
    Error::new(
        ErrorKind::TypeError,
        format!("cannot convert {kind} to {target}"),
    )
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value.0 {
            ValueRepr::Int(val) => Ok(val),
            ValueRepr::Bool(val) => Ok(val as i64),
            ValueRepr::Float(val) if val == (val as i64) as f64 => Ok(val as i64),
            _ => Err(unsupported_conversion(value.kind(), "integer")),
        }
    }
}

impl TryFrom<Value> for usize {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let int = ok!(i64::try_from(value.clone()));
        usize::try_from(int).map_err(|_| unsupported_conversion(value.kind(), "usize"))
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value.0 {
            ValueRepr::Float(val) => Ok(val),
            ValueRepr::Int(val) => Ok(val as f64),
            ValueRepr::Bool(val) => Ok(val as i64 as f64),
            _ => Err(unsupported_conversion(value.kind(), "float")),
        }
    }
}

/// Iterates over a value.
pub struct ValueIter {
    repr: ValueIterRepr,
}

enum ValueIterRepr {
    Empty,
    List(Arc<Vec<Value>>, usize),
    Dict(Arc<ValueMap>, usize),
    Owned(std::vec::IntoIter<Value>),
}

impl ValueIter {
    pub(crate) fn empty() -> ValueIter {
        ValueIter {
            repr: ValueIterRepr::Empty,
        }
    }

    /// Returns the number of remaining items.
    pub fn len(&self) -> usize {
        match self.repr {
            ValueIterRepr::Empty => 0,
            ValueIterRepr::List(ref val, idx) => val.len() - idx,
            ValueIterRepr::Dict(ref val, idx) => val.len() - idx,
            ValueIterRepr::Owned(ref iter) => iter.len(),
        }
    }

    /// Returns true if no items remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self.repr {
            ValueIterRepr::Empty => None,
            ValueIterRepr::List(ref val, ref mut idx) => {
                let rv = some!(val.get(*idx)).clone();
                *idx += 1;
                Some(rv)
            }
            ValueIterRepr::Dict(ref val, ref mut idx) => {
                let rv = some!(val.get_index(*idx)).0.clone();
                *idx += 1;
                Some(Value(ValueRepr::String(rv)))
            }
            ValueIterRepr::Owned(ref mut iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len(), Some(self.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_truthiness() {
        assert!(!Value::from(()).is_true());
        assert!(!Value::UNDEFINED.is_true());
        assert!(Value::from(true).is_true());
        assert!(!Value::from(false).is_true());
        assert!(Value::from(42).is_true());
        assert!(!Value::from(0).is_true());
        assert!(Value::from(0.5).is_true());
        assert!(!Value::from(0.0).is_true());
        assert!(Value::from("x").is_true());
        assert!(!Value::from("").is_true());
        assert!(Value::from(vec![1]).is_true());
        assert!(!Value::from(Vec::<i32>::new()).is_true());
    }

    #[test]
    fn test_number_equality() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(Value::from(1), Value::from(1));
        assert!(Value::from(1) != Value::from(1.5));
    }

    #[test]
    fn test_string_markup_equality() {
        assert_eq!(Value::from("x"), Value::from_safe_string("x".into()));
    }

    #[test]
    fn test_float_display() {
        assert_eq!(Value::from(1.0).to_string(), "1.0");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::from(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::from(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::from(f64::NEG_INFINITY).to_string(), "-inf");
    }

    #[test]
    fn test_list_display() {
        assert_eq!(Value::from(vec![20, 30]).to_string(), "[20, 30]");
        assert_eq!(
            Value::from(vec!["a", "b"]).to_string(),
            "['a', 'b']"
        );
    }

    #[test]
    fn test_get_item_negative_index() {
        let v = Value::from(vec![10, 20, 30]);
        assert_eq!(v.get_item(&Value::from(-1)), Some(Value::from(30)));
        assert_eq!(v.get_item(&Value::from(0)), Some(Value::from(10)));
        assert_eq!(v.get_item(&Value::from(3)), None);
    }
}
