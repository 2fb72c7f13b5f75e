//! Global functions and abstractions.
//!
//! This module provides the abstractions for functions that can be
//! registered as global functions to the environment via
//! [`add_function`](crate::Environment::add_function).
//!
//! # Custom Functions
//!
//! A custom global function is a rust function which accepts the current
//! [`State`] and the raw argument slice and returns a value.  The
//! [`from_args`](crate::value::from_args) helper performs the usual typed
//! conversions:
//!
//! ```rust
//! # use vinja::{Environment, Error, State};
//! # use vinja::value::{from_args, Value};
//! # let mut env = Environment::new();
//! fn repeat(_state: &State, args: &[Value]) -> Result<Value, Error> {
//!     let (s, n): (String, usize) = from_args(args)?;
//!     Ok(Value::from(s.repeat(n)))
//! }
//!
//! env.add_function("repeat", repeat);
//! ```
use std::fmt;
use std::sync::Mutex;

use crate::error::{Error, ErrorKind};
use crate::value::argtypes::split_kwargs;
use crate::value::{from_args, Object, Value, ValueMap};
use crate::vm::State;

/// Returns a list of numbers in a range.
///
/// With one argument counts from zero, with two from `lower` to `upper`
/// (exclusive), the third argument is the step size.  Ranges that would
/// produce more elements than the environment's configured maximum raise
/// a [`SecurityError`](crate::ErrorKind::SecurityError) before any
/// allocation happens.
pub fn range(state: &State, args: &[Value]) -> Result<Value, Error> {
    let (lower, upper, step): (i64, Option<i64>, Option<i64>) = ok!(from_args(args));
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::new(
            ErrorKind::ArgumentError,
            "range() step must not be zero",
        ));
    }
    let (lower, upper) = match upper {
        Some(upper) => (lower, upper),
        None => (0, lower),
    };
    let span = if step > 0 {
        (upper as i128 - lower as i128).max(0)
    } else {
        (lower as i128 - upper as i128).max(0)
    };
    let step_size = step.unsigned_abs() as i128;
    let count = ((span + step_size - 1) / step_size) as u128;
    let max_range = state.env().max_range() as u128;
    if count > max_range {
        return Err(Error::new(
            ErrorKind::SecurityError,
            format!("range of {count} elements exceeds the maximum of {max_range}"),
        ));
    }
    let mut rv = Vec::with_capacity(count as usize);
    let mut value = lower;
    for _ in 0..count {
        rv.push(Value::from(value));
        value = value.wrapping_add(step);
    }
    Ok(Value::from(rv))
}

/// Creates a dict.
///
/// Accepts either a single mapping or keyword arguments:
/// `dict(a=1, b=2)`.
pub fn dict(_state: &State, args: &[Value]) -> Result<Value, Error> {
    let (args, kwargs) = split_kwargs(args);
    match (args, kwargs) {
        ([], Some(kwargs)) => Ok(Value::from_value_map(kwargs.clone())),
        ([value], None) => {
            if value.is_undefined() {
                Ok(Value::from_value_map(ValueMap::new()))
            } else if let Some(map) = value.as_dict() {
                Ok(Value::from_value_map((**map).clone()))
            } else {
                Err(Error::new(
                    ErrorKind::TypeError,
                    format!("cannot convert {} to dict", value.kind()),
                ))
            }
        }
        ([], None) => Ok(Value::from_value_map(ValueMap::new())),
        _ => Err(Error::new(
            ErrorKind::ArgumentError,
            "dict() takes a mapping or keyword arguments",
        )),
    }
}

/// Prints the variables known to the current render context.
///
/// This is also available as the `{% debug %}` tag.
pub fn debug(state: &State, args: &[Value]) -> Result<Value, Error> {
    let () = ok!(from_args(args));
    Ok(Value::from(format!("{state:#?}")))
}

/// Creates a namespace whose attributes can be assigned with `{% set %}`.
///
/// ```jinja
/// {% set ns = namespace(found=false) %}
/// {% for item in items %}
///   {% if item.check %}{% set ns.found = true %}{% endif %}
/// {% endfor %}
/// ```
pub fn namespace(_state: &State, args: &[Value]) -> Result<Value, Error> {
    let (args, kwargs) = split_kwargs(args);
    if !args.is_empty() {
        return Err(Error::new(
            ErrorKind::ArgumentError,
            "namespace() only accepts keyword arguments",
        ));
    }
    let values = kwargs.map(|map| (*map).clone()).unwrap_or_default();
    Ok(Value::from_object(Namespace {
        values: Mutex::new(values),
    }))
}

/// The object behind the [`namespace`] function.
pub(crate) struct Namespace {
    values: Mutex<ValueMap>,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.lock().unwrap().iter())
            .finish()
    }
}

impl Object for Namespace {
    fn type_name(&self) -> &'static str {
        "namespace"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.values.lock().unwrap().get(name).cloned()
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<(), Error> {
        self.values.lock().unwrap().insert(name.into(), value);
        Ok(())
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<namespace>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_range() {
        let env = crate::Environment::new();
        let state = env.empty_state();
        assert_eq!(
            range(&state, &[Value::from(3)]).unwrap(),
            Value::from(vec![0, 1, 2])
        );
        assert_eq!(
            range(&state, &[Value::from(2), Value::from(5)]).unwrap(),
            Value::from(vec![2, 3, 4])
        );
        assert_eq!(
            range(&state, &[Value::from(9), Value::from(0), Value::from(-3)]).unwrap(),
            Value::from(vec![9, 6, 3])
        );
    }

    #[test]
    fn test_range_guard() {
        let mut env = crate::Environment::new();
        env.set_max_range(10);
        let state = env.empty_state();
        let err = range(&state, &[Value::from(11)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityError);
    }
}
