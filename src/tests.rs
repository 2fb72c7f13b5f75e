//! Test functions and abstractions.
//!
//! Test functions are like [filters](crate::filters) but a different
//! syntax is used to invoke them and they have to return boolean values.
//! For instance the expression `{% if foo is odd %}` invokes the
//! [`is_odd`] test to check if the value is indeed an odd number.
//!
//! To create a custom test write a function that takes at least a
//! [`&State`](crate::State) and value argument and returns a boolean
//! result, then register it with
//! [`add_test`](crate::Environment::add_test).
//!
//! ```
//! # use vinja::{State, Environment, Error};
//! # let mut env = Environment::new();
//! fn is_lowercase(_state: &State, value: String) -> Result<bool, Error> {
//!    Ok(value.chars().all(|x| x.is_lowercase()))
//! }
//!
//! env.add_test("lowercase", is_lowercase);
//! ```
use std::sync::Arc;

use crate::error::Error;
use crate::value::{ops, ArgType, Callable, CallableKind, FunctionArgs, Value, ValueKind};
use crate::vm::State;

/// A utility trait that represents test functions.
pub trait Test<V, Args>: Send + Sync + 'static {
    /// Performs a test on a value with the given arguments.
    fn perform(&self, state: &State, value: V, args: Args) -> Result<bool, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, V, $($name),*> Test<V, ($($name,)*)> for Func
        where
            Func: Fn(&State, V, $($name),*) -> Result<bool, Error> + Send + Sync + 'static
        {
            fn perform(&self, state: &State, value: V, args: ($($name,)*)) -> Result<bool, Error> {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)(state, value, $($name,)*)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }

/// Wraps a test function into a callable test value.
pub(crate) fn make_test<F, V, Args>(name: &str, f: F) -> Value
where
    F: Test<V, Args>,
    V: ArgType + 'static,
    Args: FunctionArgs + 'static,
{
    Value(crate::value::ValueRepr::Callable(Arc::new(
        Callable::new_native(name, CallableKind::Test, move |state, args| {
            let (value, rest) = match args.split_first() {
                Some((value, rest)) => (Some(value), rest),
                None => (None, &[][..]),
            };
            f.perform(
                state,
                ok!(ArgType::from_value(value)),
                ok!(FunctionArgs::from_values(rest)),
            )
            .map(Value::from)
        }),
    )))
}

/// Checks if a value is odd.
pub fn is_odd(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(i64::try_from(v).map_or(false, |x| x % 2 != 0))
}

/// Checks if a value is even.
pub fn is_even(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(i64::try_from(v).map_or(false, |x| x % 2 == 0))
}

/// Checks if a value is divisible by another number.
pub fn is_divisibleby(_state: &State, v: Value, other: i64) -> Result<bool, Error> {
    Ok(other != 0 && i64::try_from(v).map_or(false, |x| x % other == 0))
}

/// Checks if a value is undefined.
pub fn is_undefined(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_undefined())
}

/// Checks if a value is defined.
pub fn is_defined(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(!v.is_undefined())
}

/// Checks if a value is none.
pub fn is_none(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_none())
}

/// Checks if a value is safe from auto escaping.
///
/// By default this test is also registered under the alias `escaped`.
pub fn is_safe(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_safe())
}

/// Checks if this value is a number.
pub fn is_number(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::Number))
}

/// Checks if this value is an integer.
pub fn is_integer(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.0, crate::value::ValueRepr::Int(_)))
}

/// Checks if this value is a float.
pub fn is_float(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.0, crate::value::ValueRepr::Float(_)))
}

/// Checks if this value is a string.
pub fn is_string(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::String))
}

/// Checks if this value is a boolean.
pub fn is_boolean(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::Bool))
}

/// Checks if this value is the true singleton.
pub fn is_true(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.0, crate::value::ValueRepr::Bool(true)))
}

/// Checks if this value is the false singleton.
pub fn is_false(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.0, crate::value::ValueRepr::Bool(false)))
}

/// Checks if this value is a mapping.
pub fn is_mapping(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::Dict))
}

/// Checks if this value is a sequence.
pub fn is_sequence(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::List))
}

/// Checks if this value can be iterated over.
pub fn is_iterable(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.try_iter().is_ok())
}

/// Checks if this value is callable.
pub fn is_callable(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(matches!(v.kind(), ValueKind::Callable))
}

/// Checks if the value is starting with a string.
pub fn is_startingwith(_state: &State, v: String, other: String) -> Result<bool, Error> {
    Ok(v.starts_with(&other))
}

/// Checks if the value is ending with a string.
pub fn is_endingwith(_state: &State, v: String, other: String) -> Result<bool, Error> {
    Ok(v.ends_with(&other))
}

/// Checks if the string is all lowercase.
pub fn is_lower(_state: &State, v: String) -> Result<bool, Error> {
    Ok(!v.is_empty() && v.chars().all(|c| !c.is_uppercase()))
}

/// Checks if the string is all uppercase.
pub fn is_upper(_state: &State, v: String) -> Result<bool, Error> {
    Ok(!v.is_empty() && v.chars().all(|c| !c.is_lowercase()))
}

/// Checks if two values point at the same object.
///
/// Primitives compare by value, containers and objects by identity.
pub fn is_sameas(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    use crate::value::ValueRepr;
    Ok(match (&v.0, &other.0) {
        (ValueRepr::None, ValueRepr::None) => true,
        (ValueRepr::Undefined(..), ValueRepr::Undefined(..)) => true,
        (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
        (ValueRepr::Int(a), ValueRepr::Int(b)) => a == b,
        (ValueRepr::Float(a), ValueRepr::Float(b)) => a == b,
        (ValueRepr::String(a), ValueRepr::String(b)) => Arc::ptr_eq(a, b),
        (ValueRepr::Markup(a), ValueRepr::Markup(b)) => Arc::ptr_eq(a, b),
        (ValueRepr::List(a), ValueRepr::List(b)) => Arc::ptr_eq(a, b),
        (ValueRepr::Dict(a, _), ValueRepr::Dict(b, _)) => Arc::ptr_eq(a, b),
        (ValueRepr::Callable(a), ValueRepr::Callable(b)) => Arc::ptr_eq(a, b),
        (ValueRepr::Custom(a), ValueRepr::Custom(b)) => Arc::ptr_eq(a, b),
        _ => false,
    })
}

/// Checks if a value is contained in another one.
pub fn is_in(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    ops::contains(&other, &v).map(|rv| rv.is_true())
}

/// Checks if two values are equal.
pub fn is_eq(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    Ok(v == other)
}

/// Checks if two values are not equal.
pub fn is_ne(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    Ok(v != other)
}

/// Checks if a value is less than another.
pub fn is_lt(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    Ok(v < other)
}

/// Checks if a value is less than or equal to another.
pub fn is_le(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    Ok(v <= other)
}

/// Checks if a value is greater than another.
pub fn is_gt(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    Ok(v > other)
}

/// Checks if a value is greater than or equal to another.
pub fn is_ge(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    Ok(v >= other)
}
