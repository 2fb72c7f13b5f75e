//! Filter functions and abstractions.
//!
//! This engine inherits from Jinja2 the concept of filter functions.
//! These are functions which are applied to values to modify them.  For
//! example the expression `{{ 42|filter(23) }}` invokes the filter
//! `filter` with the arguments `42` and `23`.
//!
//! To create a custom filter write a function that takes at least a
//! [`&State`](crate::State) and value argument and register it with
//! [`add_filter`](crate::Environment::add_filter).
//!
//! ```
//! # use vinja::{Environment, State, Error};
//! # let mut env = Environment::new();
//! fn slugify(_state: &State, value: String) -> Result<String, Error> {
//!     Ok(value.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-"))
//! }
//!
//! env.add_filter("slugify", slugify);
//! ```
//!
//! The necessary conversions are performed automatically via the
//! [`ArgType`](crate::value::ArgType) and [`Into`] traits.
use std::fmt::Write;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::utils::HtmlEscape;
use crate::value::{
    ops, ArgType, Callable, CallableKind, FunctionArgs, Rest, Value, ValueKind, ValueRepr,
};
use crate::vm::State;

/// A utility trait that represents filters.
pub trait Filter<V, Rv, Args>: Send + Sync + 'static {
    /// Applies a filter to a value with the given arguments.
    fn apply_to(&self, state: &State, value: V, args: Args) -> Result<Rv, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, V, Rv, $($name),*> Filter<V, Rv, ($($name,)*)> for Func
        where
            Func: Fn(&State, V, $($name),*) -> Result<Rv, Error> + Send + Sync + 'static
        {
            fn apply_to(&self, state: &State, value: V, args: ($($name,)*)) -> Result<Rv, Error> {
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

/// Wraps a filter function into a callable filter value.
pub(crate) fn make_filter<F, V, Rv, Args>(name: &str, f: F) -> Value
where
    F: Filter<V, Rv, Args>,
    V: ArgType + 'static,
    Rv: Into<Value> + 'static,
    Args: FunctionArgs + 'static,
{
    Value(ValueRepr::Callable(Arc::new(Callable::new_native(
        name,
        CallableKind::Filter,
        move |state, args| {
            let (value, rest) = match args.split_first() {
                Some((value, rest)) => (Some(value), rest),
                None => (None, &[][..]),
            };
            f.apply_to(
                state,
                ok!(ArgType::from_value(value)),
                ok!(FunctionArgs::from_values(rest)),
            )
            .map(Into::into)
        },
    ))))
}

/// Like [`make_filter`] but marks the filter as safe for constant folding.
pub(crate) fn make_pure_filter<F, V, Rv, Args>(name: &str, f: F) -> Value
where
    F: Filter<V, Rv, Args>,
    V: ArgType + 'static,
    Rv: Into<Value> + 'static,
    Args: FunctionArgs + 'static,
{
    match make_filter(name, f) {
        Value(ValueRepr::Callable(callable)) => {
            let callable = Arc::try_unwrap(callable).ok().unwrap();
            Value(ValueRepr::Callable(Arc::new(callable.mark_pure())))
        }
        _ => unreachable!(),
    }
}

fn iter_to_vec(value: &Value) -> Result<Vec<Value>, Error> {
    value.try_iter().map(|iter| iter.collect())
}

/// Marks a value as safe.  This converts it into a string.
pub fn safe(_state: &State, v: String) -> Result<Value, Error> {
    Ok(Value::from_safe_string(v))
}

/// HTML escapes a string.
///
/// By default this filter is also registered under the alias `e`.
pub fn escape(_state: &State, v: Value) -> Result<Value, Error> {
    if v.is_safe() {
        Ok(v)
    } else {
        Ok(Value::from_safe_string(
            HtmlEscape(&v.to_string()).to_string(),
        ))
    }
}

/// Converts a value to uppercase.
pub fn upper(_state: &State, v: String) -> Result<String, Error> {
    Ok(v.to_uppercase())
}

/// Converts a value to lowercase.
pub fn lower(_state: &State, v: String) -> Result<String, Error> {
    Ok(v.to_lowercase())
}

/// Converts a value to title case.
pub fn title(_state: &State, v: String) -> Result<String, Error> {
    let mut rv = String::with_capacity(v.len());
    let mut capitalize = true;
    for c in v.chars() {
        if c.is_alphanumeric() {
            if capitalize {
                rv.extend(c.to_uppercase());
            } else {
                rv.extend(c.to_lowercase());
            }
            capitalize = false;
        } else {
            rv.push(c);
            capitalize = true;
        }
    }
    Ok(rv)
}

/// Capitalizes the first character, lowercases the rest.
pub fn capitalize(_state: &State, v: String) -> Result<String, Error> {
    let mut chars = v.chars();
    match chars.next() {
        Some(first) => Ok(first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect()),
        None => Ok(v),
    }
}

/// Does a string replace.
pub fn replace(_state: &State, v: String, from: String, to: String) -> Result<String, Error> {
    Ok(v.replace(&from, &to))
}

/// Returns the "length" of the value.
///
/// By default this filter is also registered under the alias `count`.
pub fn length(_state: &State, v: Value) -> Result<Value, Error> {
    v.len().map(Value::from).ok_or_else(|| {
        Error::new(
            ErrorKind::TypeError,
            format!("cannot calculate length of value of type {}", v.kind()),
        )
    })
}

/// Trims whitespace (or other characters) from both ends.
pub fn trim(_state: &State, v: String, chars: Option<String>) -> Result<String, Error> {
    match chars {
        Some(chars) => {
            let chars = chars.chars().collect::<Vec<_>>();
            Ok(v.trim_matches(&chars[..]).to_string())
        }
        None => Ok(v.trim().to_string()),
    }
}

/// Dict sorting functionality.
///
/// Sorts by key; pass `true` to sort by value instead.
pub fn dictsort(_state: &State, v: Value, by_value: Option<bool>) -> Result<Value, Error> {
    let map = ok!(v.as_dict().ok_or_else(|| Error::new(
        ErrorKind::TypeError,
        "cannot convert value into pair list",
    )));
    let mut pairs = map
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<Vec<_>>();
    if by_value.unwrap_or(false) {
        pairs.sort_by(|a, b| a.1.cmp(&b.1));
    } else {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
    }
    Ok(Value::from(
        pairs
            .into_iter()
            .map(|(k, v)| Value::from(vec![Value::from(k), v]))
            .collect::<Vec<_>>(),
    ))
}

/// Returns the key/value pairs of a dict as a list.
pub fn items(_state: &State, v: Value) -> Result<Value, Error> {
    let map = ok!(v.as_dict().ok_or_else(|| Error::new(
        ErrorKind::TypeError,
        format!("cannot get items of value of type {}", v.kind()),
    )));
    Ok(Value::from(
        map.iter()
            .map(|(k, v)| Value::from(vec![Value::from(k.clone()), v.clone()]))
            .collect::<Vec<_>>(),
    ))
}

/// Reverses a list or string.
pub fn reverse(_state: &State, v: Value) -> Result<Value, Error> {
    if let Some(s) = v.as_str() {
        Ok(Value::from(s.chars().rev().collect::<String>()))
    } else if matches!(v.kind(), ValueKind::List) {
        let mut rv = ok!(iter_to_vec(&v));
        rv.reverse();
        Ok(Value::from(rv))
    } else {
        Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot reverse value of type {}", v.kind()),
        ))
    }
}

/// Joins a sequence by a separator.
pub fn join(_state: &State, val: Value, joiner: Option<String>) -> Result<String, Error> {
    if val.is_undefined() || val.is_none() {
        return Ok(String::new());
    }

    let joiner = joiner.as_deref().unwrap_or("");

    if let Some(s) = val.as_str() {
        let mut rv = String::new();
        for c in s.chars() {
            if !rv.is_empty() {
                rv.push_str(joiner);
            }
            rv.push(c);
        }
        Ok(rv)
    } else {
        let mut rv = String::new();
        for item in ok!(val.try_iter()) {
            if !rv.is_empty() {
                rv.push_str(joiner);
            }
            if let Some(s) = item.as_str() {
                rv.push_str(s);
            } else {
                write!(rv, "{item}").ok();
            }
        }
        Ok(rv)
    }
}

/// Splits a string at a separator (whitespace by default).
pub fn split(_state: &State, v: String, sep: Option<String>) -> Result<Value, Error> {
    Ok(match sep {
        Some(sep) => v.split(&sep as &str).map(Value::from).collect(),
        None => v.split_whitespace().map(Value::from).collect(),
    })
}

/// Splits a string into its lines.
pub fn lines(_state: &State, v: String) -> Result<Value, Error> {
    Ok(v.lines().map(Value::from).collect())
}

/// Returns the value if it's defined, a fallback otherwise.
///
/// By default this filter is also registered under the alias `d`.  If the
/// third argument is true, falsy values trigger the fallback as well.
pub fn default(
    _state: &State,
    value: Value,
    other: Option<Value>,
    boolean: Option<bool>,
) -> Result<Value, Error> {
    let use_default = if boolean.unwrap_or(false) {
        !value.is_true()
    } else {
        value.is_undefined()
    };
    Ok(if use_default {
        other.unwrap_or_else(|| Value::from(""))
    } else {
        value
    })
}

/// Returns the first item of a sequence or string.
pub fn first(_state: &State, v: Value) -> Result<Value, Error> {
    if let Some(s) = v.as_str() {
        Ok(s.chars()
            .next()
            .map(|c| Value::from(c.to_string()))
            .unwrap_or(Value::UNDEFINED))
    } else {
        Ok(ok!(v.try_iter()).next().unwrap_or(Value::UNDEFINED))
    }
}

/// Returns the last item of a sequence or string.
pub fn last(_state: &State, v: Value) -> Result<Value, Error> {
    if let Some(s) = v.as_str() {
        Ok(s.chars()
            .next_back()
            .map(|c| Value::from(c.to_string()))
            .unwrap_or(Value::UNDEFINED))
    } else {
        Ok(ok!(iter_to_vec(&v)).pop().unwrap_or(Value::UNDEFINED))
    }
}

/// Returns the smallest item of a sequence.
pub fn min(_state: &State, v: Value) -> Result<Value, Error> {
    Ok(ok!(v.try_iter()).min().unwrap_or(Value::UNDEFINED))
}

/// Returns the largest item of a sequence.
pub fn max(_state: &State, v: Value) -> Result<Value, Error> {
    Ok(ok!(v.try_iter()).max().unwrap_or(Value::UNDEFINED))
}

/// Sums up a sequence of numbers.
pub fn sum(_state: &State, v: Value) -> Result<Value, Error> {
    let mut rv = Value::from(0);
    for item in ok!(v.try_iter()) {
        rv = ok!(ops::add(&rv, &item));
    }
    Ok(rv)
}

/// Sorts a sequence, optionally in reverse order.
pub fn sort(_state: &State, v: Value, reverse: Option<bool>) -> Result<Value, Error> {
    let mut rv = ok!(iter_to_vec(&v));
    rv.sort();
    if reverse.unwrap_or(false) {
        rv.reverse();
    }
    Ok(Value::from(rv))
}

/// Removes duplicated items from a sequence, keeping the first occurrence.
pub fn unique(_state: &State, v: Value) -> Result<Value, Error> {
    let mut rv = Vec::new();
    for item in ok!(v.try_iter()) {
        if !rv.contains(&item) {
            rv.push(item);
        }
    }
    Ok(Value::from(rv))
}

/// Returns the absolute value of a number.
pub fn abs(_state: &State, v: Value) -> Result<Value, Error> {
    match v.0 {
        ValueRepr::Int(x) => Ok(Value::from(x.wrapping_abs())),
        ValueRepr::Float(x) => Ok(Value::from(x.abs())),
        _ => Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot get absolute value of {}", v.kind()),
        )),
    }
}

/// Rounds a number to a given precision (zero digits by default).
pub fn round(_state: &State, v: Value, precision: Option<i64>) -> Result<Value, Error> {
    match v.0 {
        ValueRepr::Int(_) => Ok(v),
        ValueRepr::Float(x) => {
            let factor = 10f64.powi(precision.unwrap_or(0) as i32);
            Ok(Value::from((x * factor).round() / factor))
        }
        _ => Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot round value of type {}", v.kind()),
        )),
    }
}

/// Converts a value into an integer.
pub fn int(_state: &State, v: Value) -> Result<Value, Error> {
    match v.0 {
        ValueRepr::Int(_) => Ok(v),
        ValueRepr::Float(x) => Ok(Value::from(x as i64)),
        ValueRepr::Bool(x) => Ok(Value::from(x as i64)),
        ValueRepr::String(ref s) | ValueRepr::Markup(ref s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| Error::new(ErrorKind::TypeError, format!("invalid integer {s:?}"))),
        _ => Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot convert {} to integer", v.kind()),
        )),
    }
}

/// Converts a value into a float.
pub fn float(_state: &State, v: Value) -> Result<Value, Error> {
    match v.0 {
        ValueRepr::Float(_) => Ok(v),
        ValueRepr::Int(x) => Ok(Value::from(x as f64)),
        ValueRepr::Bool(x) => Ok(Value::from(x as i64 as f64)),
        ValueRepr::String(ref s) | ValueRepr::Markup(ref s) => s
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| Error::new(ErrorKind::TypeError, format!("invalid float {s:?}"))),
        _ => Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot convert {} to float", v.kind()),
        )),
    }
}

/// Converts a value into a string.
pub fn string(_state: &State, v: Value) -> Result<Value, Error> {
    Ok(if matches!(v.kind(), ValueKind::String) {
        v
    } else {
        Value::from(v.to_string())
    })
}

/// Converts a value into its truthiness.
pub fn bool(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_true())
}

/// Converts a value into a list.
pub fn list(_state: &State, v: Value) -> Result<Value, Error> {
    iter_to_vec(&v).map(Value::from)
}

/// Batches items into sub-lists of a given size.
///
/// An optional third argument fills up the last batch.
pub fn batch(
    _state: &State,
    v: Value,
    count: usize,
    fill_with: Option<Value>,
) -> Result<Value, Error> {
    if count == 0 {
        return Err(Error::new(ErrorKind::ArgumentError, "count cannot be 0"));
    }
    let mut rv = Vec::new();
    let mut tmp = Vec::with_capacity(count);

    for item in ok!(v.try_iter()) {
        if tmp.len() == count {
            rv.push(Value::from(std::mem::replace(
                &mut tmp,
                Vec::with_capacity(count),
            )));
        }
        tmp.push(item);
    }

    if !tmp.is_empty() {
        if let Some(ref filler) = fill_with {
            while tmp.len() < count {
                tmp.push(filler.clone());
            }
        }
        rv.push(Value::from(tmp));
    }

    Ok(Value::from(rv))
}

/// Slices an iterable into a given number of columns.
///
/// An optional third argument fills up missing spots in the last columns.
pub fn slice(
    _state: &State,
    v: Value,
    count: usize,
    fill_with: Option<Value>,
) -> Result<Value, Error> {
    if count == 0 {
        return Err(Error::new(ErrorKind::ArgumentError, "count cannot be 0"));
    }
    let items = ok!(iter_to_vec(&v));
    let len = items.len();
    let items_per_slice = len / count;
    let slices_with_extra = len % count;
    let mut offset = 0;
    let mut rv = Vec::with_capacity(count);

    for slice in 0..count {
        let start = offset + slice * items_per_slice;
        if slice < slices_with_extra {
            offset += 1;
        }
        let end = offset + (slice + 1) * items_per_slice;
        let mut tmp = items[start..end].to_vec();
        if slice >= slices_with_extra {
            if let Some(ref filler) = fill_with {
                tmp.push(filler.clone());
            }
        }
        rv.push(Value::from(tmp));
    }

    Ok(Value::from(rv))
}

/// Indents every line but the first by the given width.
///
/// Pass `true` as third argument to indent the first line too.
pub fn indent(
    _state: &State,
    v: String,
    width: Option<usize>,
    indent_first_line: Option<bool>,
) -> Result<String, Error> {
    let width = width.unwrap_or(4);
    let indentation = " ".repeat(width);
    let mut rv = String::new();
    for (idx, line) in v.lines().enumerate() {
        if idx > 0 {
            rv.push('\n');
        }
        if !line.is_empty() && (idx > 0 || indent_first_line.unwrap_or(false)) {
            rv.push_str(&indentation);
        }
        rv.push_str(line);
    }
    Ok(rv)
}

/// Truncates a string to a maximum length, appending an ellipsis.
pub fn truncate(
    _state: &State,
    v: String,
    length: Option<usize>,
    end: Option<String>,
) -> Result<String, Error> {
    let length = length.unwrap_or(255);
    let end = end.unwrap_or_else(|| "...".to_string());
    if v.chars().count() <= length {
        return Ok(v);
    }
    let truncated: String = v.chars().take(length.saturating_sub(end.chars().count())).collect();
    Ok(format!("{truncated}{end}"))
}

/// Counts the words in a string.
pub fn wordcount(_state: &State, v: String) -> Result<Value, Error> {
    Ok(Value::from(v.split_whitespace().count()))
}

/// Looks up an attribute by name.
///
/// Unlike the dot operator this only looks at real attributes, which is
/// useful when the name is computed.
pub fn attr(_state: &State, v: Value, name: String) -> Result<Value, Error> {
    Ok(v.get_attr(&name).unwrap_or(Value::UNDEFINED))
}

/// Applies a filter to every item of a sequence.
///
/// Extra arguments are forwarded to the applied filter:
/// `users|map('attr', 'name')`.
pub fn map(
    state: &State,
    v: Value,
    filter_name: String,
    args: Rest<Value>,
) -> Result<Value, Error> {
    let mut rv = Vec::new();
    for item in ok!(v.try_iter()) {
        let mut call_args = Vec::with_capacity(args.0.len() + 1);
        call_args.push(item);
        call_args.extend(args.0.iter().cloned());
        rv.push(ok!(state.apply_filter(&filter_name, &call_args)));
    }
    Ok(Value::from(rv))
}

fn test_by_name(
    state: &State,
    item: &Value,
    test_name: Option<&str>,
    arg: Option<&Value>,
) -> Result<bool, Error> {
    match test_name {
        Some(test_name) => {
            let mut args = vec![item.clone()];
            if let Some(arg) = arg {
                args.push(arg.clone());
            }
            state.perform_test(test_name, &args)
        }
        None => Ok(item.is_true()),
    }
}

/// Keeps items that pass a test (truthy items without a test).
pub fn select(
    state: &State,
    v: Value,
    test_name: Option<String>,
    arg: Option<Value>,
) -> Result<Value, Error> {
    let mut rv = Vec::new();
    for item in ok!(v.try_iter()) {
        if ok!(test_by_name(state, &item, test_name.as_deref(), arg.as_ref())) {
            rv.push(item);
        }
    }
    Ok(Value::from(rv))
}

/// Drops items that pass a test (truthy items without a test).
pub fn reject(
    state: &State,
    v: Value,
    test_name: Option<String>,
    arg: Option<Value>,
) -> Result<Value, Error> {
    let mut rv = Vec::new();
    for item in ok!(v.try_iter()) {
        if !ok!(test_by_name(state, &item, test_name.as_deref(), arg.as_ref())) {
            rv.push(item);
        }
    }
    Ok(Value::from(rv))
}

/// Keeps items whose attribute passes a test.
///
/// Without a test the attribute's truthiness decides.
pub fn selectattr(
    state: &State,
    v: Value,
    attr_name: String,
    test_name: Option<String>,
    arg: Option<Value>,
) -> Result<Value, Error> {
    let mut rv = Vec::new();
    for item in ok!(v.try_iter()) {
        let attr = item.get_attr(&attr_name).unwrap_or(Value::UNDEFINED);
        if ok!(test_by_name(state, &attr, test_name.as_deref(), arg.as_ref())) {
            rv.push(item);
        }
    }
    Ok(Value::from(rv))
}

/// Drops items whose attribute passes a test.
pub fn rejectattr(
    state: &State,
    v: Value,
    attr_name: String,
    test_name: Option<String>,
    arg: Option<Value>,
) -> Result<Value, Error> {
    let mut rv = Vec::new();
    for item in ok!(v.try_iter()) {
        let attr = item.get_attr(&attr_name).unwrap_or(Value::UNDEFINED);
        if !ok!(test_by_name(state, &attr, test_name.as_deref(), arg.as_ref())) {
            rv.push(item);
        }
    }
    Ok(Value::from(rv))
}

/// Groups a sequence of objects by an attribute.
///
/// The result is a list of `[grouper, list]` pairs in first-seen order.
pub fn groupby(_state: &State, v: Value, attr_name: String) -> Result<Value, Error> {
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for item in ok!(v.try_iter()) {
        let key = item.get_attr(&attr_name).unwrap_or(Value::UNDEFINED);
        match groups.iter_mut().find(|(grouper, _)| *grouper == key) {
            Some((_, items)) => items.push(item),
            None => groups.push((key, vec![item])),
        }
    }
    Ok(Value::from(
        groups
            .into_iter()
            .map(|(grouper, items)| Value::from(vec![grouper, Value::from(items)]))
            .collect::<Vec<_>>(),
    ))
}

/// Dumps a value to JSON.
///
/// The resulting value is safe to use in HTML as special characters are
/// escaped into unicode sequences.  The optional parameter enables pretty
/// printing.
pub fn tojson(_state: &State, value: Value, pretty: Option<bool>) -> Result<Value, Error> {
    if pretty.unwrap_or(false) {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .map_err(|err| {
        Error::new(ErrorKind::BadSerialization, "cannot serialize to JSON").with_source(err)
    })
    .map(|s| {
        let mut rv = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '<' => rv.push_str("\\u003c"),
                '>' => rv.push_str("\\u003e"),
                '&' => rv.push_str("\\u0026"),
                '\'' => rv.push_str("\\u0027"),
                _ => rv.push(c),
            }
        }
        Value::from_safe_string(rv)
    })
}

/// URL encodes a value.
///
/// If given a map it encodes the parameters into a query string,
/// otherwise it encodes the stringified value.  None and undefined
/// become empty strings.
pub fn urlencode(_state: &State, value: Value) -> Result<String, Error> {
    const SET: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
        .remove(b'/')
        .remove(b'.')
        .remove(b'-')
        .remove(b'_')
        .add(b' ');
    match &value.0 {
        ValueRepr::None | ValueRepr::Undefined(..) => Ok("".into()),
        ValueRepr::Dict(map, _) => {
            let mut rv = String::new();
            for (idx, (k, v)) in map.iter().enumerate() {
                if idx > 0 {
                    rv.push('&');
                }
                write!(
                    rv,
                    "{}={}",
                    percent_encoding::utf8_percent_encode(k, SET),
                    percent_encoding::utf8_percent_encode(&v.to_string(), SET)
                )
                .ok();
            }
            Ok(rv)
        }
        _ => Ok(percent_encoding::utf8_percent_encode(&value.to_string(), SET).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_basic_filters() {
        let env = crate::Environment::new();
        let state = env.empty_state();
        assert_eq!(
            upper(&state, "hello".into()).unwrap(),
            "HELLO".to_string()
        );
        assert_eq!(
            title(&state, "hello world".into()).unwrap(),
            "Hello World".to_string()
        );
        assert_eq!(
            capitalize(&state, "hELLO".into()).unwrap(),
            "Hello".to_string()
        );
        assert_eq!(
            truncate(&state, "hello world".into(), Some(8), None).unwrap(),
            "hello...".to_string()
        );
        assert_eq!(wordcount(&state, "a b  c".into()).unwrap(), Value::from(3));
    }

    #[test]
    fn test_batch_and_slice() {
        let env = crate::Environment::new();
        let state = env.empty_state();
        let v = Value::from(vec![1, 2, 3, 4, 5]);
        let batched = batch(&state, v.clone(), 2, None).unwrap();
        assert_eq!(batched.to_string(), "[[1, 2], [3, 4], [5]]");
        let sliced = slice(&state, v, 2, None).unwrap();
        assert_eq!(sliced.to_string(), "[[1, 2, 3], [4, 5]]");
    }

    #[test]
    fn test_groupby() {
        let env = crate::Environment::new();
        let state = env.empty_state();
        let value = Value::from_serializable(&serde_json::json!([
            {"city": "a", "name": "x"},
            {"city": "b", "name": "y"},
            {"city": "a", "name": "z"},
        ]));
        let grouped = groupby(&state, value, "city".into()).unwrap();
        assert_eq!(grouped.len(), Some(2));
    }
}
