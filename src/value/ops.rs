use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueRepr};

pub enum CoerceResult<'a> {
    I64(i64, i64),
    F64(f64, f64),
    Str(&'a str, &'a str),
}

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    Some(match value.0 {
        ValueRepr::Bool(x) => x as i64 as f64,
        ValueRepr::Int(x) => x as f64,
        ValueRepr::Float(x) => x,
        _ => return None,
    })
}

pub fn coerce<'x>(a: &'x Value, b: &'x Value) -> Option<CoerceResult<'x>> {
    match (&a.0, &b.0) {
        (ValueRepr::Int(a), ValueRepr::Int(b)) => Some(CoerceResult::I64(*a, *b)),
        (
            ValueRepr::String(a) | ValueRepr::Markup(a),
            ValueRepr::String(b) | ValueRepr::Markup(b),
        ) => Some(CoerceResult::Str(a, b)),
        (ValueRepr::Float(a), _) => Some(CoerceResult::F64(*a, some!(as_f64(b)))),
        (_, ValueRepr::Float(b)) => Some(CoerceResult::F64(some!(as_f64(a)), *b)),
        (ValueRepr::Bool(a), ValueRepr::Bool(b)) => {
            Some(CoerceResult::I64(*a as i64, *b as i64))
        }
        (ValueRepr::Bool(a), ValueRepr::Int(b)) => Some(CoerceResult::I64(*a as i64, *b)),
        (ValueRepr::Int(a), ValueRepr::Bool(b)) => Some(CoerceResult::I64(*a, *b as i64)),
        _ => None,
    }
}

fn impossible_op(op: &str, lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::TypeError,
        format!(
            "tried to use {} operator on unsupported types {} and {}",
            op,
            lhs.kind(),
            rhs.kind()
        ),
    )
}

fn failed_op(op: &str, lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::TypeError,
        format!("unable to calculate {lhs} {op} {rhs}"),
    )
}

macro_rules! math_binop {
    ($name:ident, $int:ident, $float:tt) => {
        pub fn $name(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
            match coerce(lhs, rhs) {
                Some(CoerceResult::I64(a, b)) => match a.$int(b) {
                    Some(val) => Ok(Value::from(val)),
                    None => Err(failed_op(stringify!($float), lhs, rhs)),
                },
                Some(CoerceResult::F64(a, b)) => Ok((a $float b).into()),
                _ => Err(impossible_op(stringify!($float), lhs, rhs)),
            }
        }
    };
}

pub fn add(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    if let (ValueRepr::List(a), ValueRepr::List(b)) = (&lhs.0, &rhs.0) {
        let mut rv = Vec::with_capacity(a.len() + b.len());
        rv.extend(a.iter().cloned());
        rv.extend(b.iter().cloned());
        return Ok(Value(ValueRepr::List(Arc::new(rv))));
    }
    if lhs.is_safe() || rhs.is_safe() {
        if let (Some(_), Some(_)) = (lhs.as_str(), rhs.as_str()) {
            return Ok(string_concat(lhs, rhs));
        }
    }
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => a
            .checked_add(b)
            .map(Value::from)
            .ok_or_else(|| failed_op("+", lhs, rhs)),
        Some(CoerceResult::F64(a, b)) => Ok((a + b).into()),
        Some(CoerceResult::Str(a, b)) => Ok(Value::from([a, b].concat())),
        None => Err(impossible_op("+", lhs, rhs)),
    }
}

math_binop!(sub, checked_sub, -);

pub fn mul(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    if let Some((s, n)) = lhs
        .as_str()
        .map(|s| (s, rhs))
        .or_else(|| rhs.as_str().map(|s| (s, lhs)))
    {
        let n = ok!(n.as_usize().ok_or_else(|| Error::new(
            ErrorKind::TypeError,
            "strings can only be multiplied with integers",
        )));
        return Ok(Value::from(s.repeat(n)));
    }
    if let Some((seq, n)) = lhs
        .as_list()
        .map(|s| (s, rhs))
        .or_else(|| rhs.as_list().map(|s| (s, lhs)))
    {
        let n = ok!(n.as_usize().ok_or_else(|| Error::new(
            ErrorKind::TypeError,
            "lists can only be multiplied with integers",
        )));
        let mut rv = Vec::with_capacity(seq.len() * n);
        for _ in 0..n {
            rv.extend(seq.iter().cloned());
        }
        return Ok(Value(ValueRepr::List(Arc::new(rv))));
    }

    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => match a.checked_mul(b) {
            Some(val) => Ok(Value::from(val)),
            None => Err(failed_op("*", lhs, rhs)),
        },
        Some(CoerceResult::F64(a, b)) => Ok((a * b).into()),
        _ => Err(impossible_op("*", lhs, rhs)),
    }
}

/// True division.  Integer operands divided by zero raise an error,
/// float division follows IEEE 754.
pub fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(_, 0)) => Err(Error::new(
            ErrorKind::ZeroDivisionError,
            format!("{lhs} / {rhs}"),
        )),
        Some(CoerceResult::I64(a, b)) => Ok((a as f64 / b as f64).into()),
        Some(CoerceResult::F64(a, b)) => Ok((a / b).into()),
        _ => Err(impossible_op("/", lhs, rhs)),
    }
}

pub fn int_div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(_, 0)) => Err(Error::new(
            ErrorKind::ZeroDivisionError,
            format!("{lhs} // {rhs}"),
        )),
        Some(CoerceResult::I64(a, b)) => a
            .checked_div_euclid(b)
            .map(Value::from)
            .ok_or_else(|| failed_op("//", lhs, rhs)),
        Some(CoerceResult::F64(a, b)) => Ok(a.div_euclid(b).into()),
        _ => Err(impossible_op("//", lhs, rhs)),
    }
}

pub fn rem(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(_, 0)) => Err(Error::new(
            ErrorKind::ZeroDivisionError,
            format!("{lhs} % {rhs}"),
        )),
        Some(CoerceResult::I64(a, b)) => a
            .checked_rem_euclid(b)
            .map(Value::from)
            .ok_or_else(|| failed_op("%", lhs, rhs)),
        Some(CoerceResult::F64(a, b)) => Ok((a % b).into()),
        _ => Err(impossible_op("%", lhs, rhs)),
    }
}

/// Implements a binary `pow` operation on values.
pub fn pow(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => {
            if b < 0 {
                Ok(((a as f64).powf(b as f64)).into())
            } else {
                match u32::try_from(b).ok().and_then(|b| a.checked_pow(b)) {
                    Some(val) => Ok(Value::from(val)),
                    None => Err(failed_op("**", lhs, rhs)),
                }
            }
        }
        Some(CoerceResult::F64(a, b)) => Ok((a.powf(b)).into()),
        _ => Err(impossible_op("**", lhs, rhs)),
    }
}

/// Implements an unary `neg` operation on value.
pub fn neg(val: &Value) -> Result<Value, Error> {
    match val.0 {
        ValueRepr::Int(x) => x
            .checked_neg()
            .map(Value::from)
            .ok_or_else(|| Error::new(ErrorKind::TypeError, "overflow on negation")),
        ValueRepr::Float(x) => Ok((-x).into()),
        _ => Err(Error::new(
            ErrorKind::TypeError,
            format!("cannot negate value of type {}", val.kind()),
        )),
    }
}

/// Attempts a string concatenation.
///
/// When either operand is markup, the other operand is escaped and the
/// result is markup again so that safety survives concatenation.
pub fn string_concat(left: &Value, right: &Value) -> Value {
    fn write_operand(buf: &mut String, value: &Value) {
        use std::fmt::Write;
        if value.is_safe() {
            buf.push_str(value.as_str().unwrap_or_default());
        } else {
            write!(buf, "{}", crate::utils::HtmlEscape(&value.to_string())).ok();
        }
    }

    if left.is_safe() || right.is_safe() {
        let mut rv = String::new();
        write_operand(&mut rv, left);
        write_operand(&mut rv, right);
        Value::from_safe_string(rv)
    } else {
        Value::from(format!("{left}{right}"))
    }
}

/// Implements a containment operation on values.
pub fn contains(container: &Value, value: &Value) -> Result<Value, Error> {
    // Undefined containers cannot hold values.
    if container.is_undefined() {
        return Ok(Value::from(false));
    }
    let rv = if let Some(s) = container.as_str() {
        match value.as_str() {
            Some(s2) => s.contains(s2),
            None => s.contains(&value.to_string()),
        }
    } else if let Some(list) = container.as_list() {
        list.iter().any(|v| v == value)
    } else if let Some(map) = container.as_dict() {
        map.contains_key(&value.as_dict_key() as &str)
    } else if let Some(obj) = container.as_object() {
        match obj.enumerate() {
            Some(items) => items.iter().any(|v| v == value),
            None => {
                return Err(Error::new(
                    ErrorKind::TypeError,
                    "cannot perform a containment check on this value",
                ))
            }
        }
    } else {
        return Err(Error::new(
            ErrorKind::TypeError,
            "cannot perform a containment check on this value",
        ));
    };
    Ok(Value::from(rv))
}

fn get_offset_and_len<F: FnOnce() -> usize>(
    start: Option<i64>,
    stop: Option<i64>,
    end: F,
) -> (usize, usize) {
    let start = start.unwrap_or(0);
    if start < 0 || stop.map_or(true, |x| x < 0) {
        let end = end();
        let start = if start < 0 {
            std::cmp::max(0, end as i64 + start) as usize
        } else {
            start as usize
        };
        let stop = match stop {
            None => end,
            Some(x) if x < 0 => std::cmp::max(0, end as i64 + x) as usize,
            Some(x) => x as usize,
        };
        (start, stop.saturating_sub(start))
    } else {
        (
            start as usize,
            (stop.unwrap() as usize).saturating_sub(start as usize),
        )
    }
}

fn range_step_backwards(
    start: Option<i64>,
    stop: Option<i64>,
    step: usize,
    end: usize,
) -> impl Iterator<Item = usize> {
    let start = match start {
        None => end.saturating_sub(1),
        Some(start) if start >= end as i64 => end.saturating_sub(1),
        Some(start) if start >= 0 => start as usize,
        Some(start) => (end as i64 + start).max(0) as usize,
    };
    let stop = match stop {
        None => 0,
        Some(stop) if stop < 0 => (end as i64 + stop).max(0) as usize,
        Some(stop) => stop as usize,
    };
    let length = if stop == 0 {
        (start + step) / step
    } else if start >= stop {
        (start - stop + step - 1) / step
    } else {
        0
    };
    (stop..=start).rev().step_by(step).take(length)
}

/// Slices a value.  Omitted bounds default to the start/end and a step
/// of one; negative indices count from the end.
pub fn slice(value: Value, start: Value, stop: Value, step: Value) -> Result<Value, Error> {
    let start = if start.is_none() {
        None
    } else {
        Some(ok!(i64::try_from(start)))
    };
    let stop = if stop.is_none() {
        None
    } else {
        Some(ok!(i64::try_from(stop)))
    };
    let step = if step.is_none() {
        1i64
    } else {
        ok!(i64::try_from(step))
    };
    if step == 0 {
        return Err(Error::new(
            ErrorKind::TypeError,
            "cannot slice by step size of 0",
        ));
    }

    match value.0 {
        ValueRepr::String(ref s) | ValueRepr::Markup(ref s) => {
            if step > 0 {
                let (start, len) = get_offset_and_len(start, stop, || s.chars().count());
                Ok(Value::from(
                    s.chars()
                        .skip(start)
                        .take(len)
                        .step_by(step as usize)
                        .collect::<String>(),
                ))
            } else {
                let chars: Vec<char> = s.chars().collect();
                Ok(Value::from(
                    range_step_backwards(start, stop, -step as usize, chars.len())
                        .map(|i| chars[i])
                        .collect::<String>(),
                ))
            }
        }
        ValueRepr::Undefined(..) | ValueRepr::None => Ok(Value::from(Vec::<Value>::new())),
        ValueRepr::List(ref items) => {
            if step > 0 {
                let (start, len) = get_offset_and_len(start, stop, || items.len());
                Ok(Value::from(
                    items
                        .iter()
                        .skip(start)
                        .take(len)
                        .step_by(step as usize)
                        .cloned()
                        .collect::<Vec<_>>(),
                ))
            } else {
                Ok(Value::from(
                    range_step_backwards(start, stop, -step as usize, items.len())
                        .map(|i| items[i].clone())
                        .collect::<Vec<_>>(),
                ))
            }
        }
        _ => Err(Error::new(
            ErrorKind::TypeError,
            format!("value of type {} cannot be sliced", value.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_adding() {
        let err = add(&Value::from("a"), &Value::from(42)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "type error: tried to use + operator on unsupported types string and number"
        );

        assert_eq!(
            add(&Value::from(1), &Value::from(2)).unwrap(),
            Value::from(3)
        );
        assert_eq!(
            add(&Value::from("foo"), &Value::from("bar")).unwrap(),
            Value::from("foobar")
        );

        let err = add(&Value::from(i64::MAX), &Value::from(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeError);
    }

    #[test]
    fn test_dividing() {
        assert_eq!(
            div(&Value::from(100), &Value::from(2)).unwrap(),
            Value::from(50.0)
        );
        let err = div(&Value::from(1), &Value::from(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ZeroDivisionError);
        let rv = div(&Value::from(1.0), &Value::from(0.0)).unwrap();
        assert_eq!(rv, Value::from(f64::INFINITY));
        let err = int_div(&Value::from(5), &Value::from(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ZeroDivisionError);
        assert_eq!(
            int_div(&Value::from(5), &Value::from(2)).unwrap(),
            Value::from(2)
        );
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            string_concat(&Value::from("foo"), &Value::from(42)),
            Value::from("foo42")
        );
        assert_eq!(
            string_concat(&Value::from(23), &Value::from(42)),
            Value::from("2342")
        );
    }

    #[test]
    fn test_slicing() {
        let v = Value::from(vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

        assert_eq!(
            slice(v.clone(), Value::from(()), Value::from(()), Value::from(())).unwrap(),
            Value::from(vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9])
        );
        assert_eq!(
            slice(v.clone(), Value::from(1), Value::from(3), Value::from(())).unwrap(),
            Value::from(vec![1, 2])
        );
        assert_eq!(
            slice(v.clone(), Value::from(()), Value::from(()), Value::from(2)).unwrap(),
            Value::from(vec![0, 2, 4, 6, 8])
        );
        assert_eq!(
            slice(v.clone(), Value::from(()), Value::from(()), Value::from(-2)).unwrap(),
            Value::from(vec![9, 7, 5, 3, 1])
        );
        assert_eq!(
            slice(v.clone(), Value::from(-8), Value::from(()), Value::from(())).unwrap(),
            Value::from(vec![2, 3, 4, 5, 6, 7, 8, 9])
        );
        assert_eq!(
            slice(v, Value::from(()), Value::from(-8), Value::from(())).unwrap(),
            Value::from(vec![0, 1])
        );
    }

    #[test]
    fn test_string_slicing() {
        let s = Value::from("abcdefghij");
        assert_eq!(
            slice(s.clone(), Value::from(()), Value::from(()), Value::from(2)).unwrap(),
            Value::from("acegi")
        );
        assert_eq!(
            slice(s, Value::from(()), Value::from(()), Value::from(-2)).unwrap(),
            Value::from("jhfdb")
        );
    }
}
