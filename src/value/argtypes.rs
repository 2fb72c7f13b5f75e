use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueRepr};

/// A utility trait that represents the return value of filters, tests and
/// functions.
///
/// It's implemented for the following types:
///
/// * `Rv` where `Rv` implements `Into<Value>`
/// * `Result<Rv, Error>` where `Rv` implements `Into<Value>`
pub trait FunctionResult {
    #[doc(hidden)]
    fn into_result(self) -> Result<Value, Error>;
}

impl<I: Into<Value>> FunctionResult for Result<I, Error> {
    fn into_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<I: Into<Value>> FunctionResult for I {
    fn into_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// A trait implemented by all filter/test argument types.
///
/// This trait is used by [`FunctionArgs`].  It's implemented for many common
/// types that are typically passed to filters, tests or functions.
///
/// There is an important difference between `String` and [`Value`]: the
/// former will stringify all values whereas the latter passes them through
/// unchanged.  `Option<T>` encodes optional trailing parameters; an
/// undefined value passed in such a position reads as `None`.
pub trait ArgType: Sized {
    #[doc(hidden)]
    fn from_value(value: Option<&Value>) -> Result<Self, Error>;

    #[doc(hidden)]
    fn from_values_at(values: &[Value], idx: &mut usize) -> Result<Self, Error> {
        let rv = Self::from_value(values.get(*idx));
        if *idx < values.len() {
            *idx += 1;
        }
        rv
    }
}

fn missing_argument() -> Error {
    Error::new(ErrorKind::ArgumentError, "missing argument")
}

impl ArgType for Value {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        value.cloned().ok_or_else(missing_argument)
    }
}

impl ArgType for String {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.to_string()),
            None => Err(missing_argument()),
        }
    }
}

impl ArgType for bool {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.is_true()),
            None => Err(missing_argument()),
        }
    }
}

macro_rules! converting_arg_type {
    ($($ty:ty)*) => {
        $(
            impl ArgType for $ty {
                fn from_value(value: Option<&Value>) -> Result<Self, Error> {
                    match value {
                        Some(value) => TryFrom::try_from(value.clone())
                            .map_err(|err: Error| {
                                Error::new(ErrorKind::ArgumentError, err.to_string())
                            }),
                        None => Err(missing_argument()),
                    }
                }
            }
        )*
    };
}

converting_arg_type!(i64 usize f64);

impl<T: ArgType> ArgType for Option<T> {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) if !value.is_undefined() => T::from_value(Some(value)).map(Some),
            _ => Ok(None),
        }
    }
}

/// Utility type to capture remaining arguments.
///
/// A filter or function can accept a trailing `Rest<Value>` parameter to
/// receive all arguments that were not consumed by earlier parameters.
#[derive(Debug)]
pub struct Rest<T>(pub Vec<T>);

impl<T: ArgType> ArgType for Rest<T> {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        Ok(Rest(match value {
            Some(value) => vec![ok!(T::from_value(Some(value)))],
            None => Vec::new(),
        }))
    }

    fn from_values_at(values: &[Value], idx: &mut usize) -> Result<Self, Error> {
        let mut rv = Vec::with_capacity(values.len() - *idx);
        while *idx < values.len() {
            rv.push(ok!(T::from_value(values.get(*idx))));
            *idx += 1;
        }
        Ok(Rest(rv))
    }
}

/// Helper trait representing valid filter, test and function arguments.
///
/// Since it's more convenient to write filters and tests with concrete
/// types instead of values, this helper trait exists to automatically
/// perform this conversion.  It is implemented for tuples up to an arity
/// of five parameters.
pub trait FunctionArgs: Sized {
    /// Converts to function arguments from a slice of values.
    #[doc(hidden)]
    fn from_values(values: &[Value]) -> Result<Self, Error>;
}

impl FunctionArgs for () {
    fn from_values(values: &[Value]) -> Result<Self, Error> {
        if values.is_empty() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::ArgumentError, "too many arguments"))
        }
    }
}

macro_rules! tuple_impls {
    ( $( $name:ident )+ ) => {
        impl<$($name: ArgType),+> FunctionArgs for ($($name,)+) {
            fn from_values(values: &[Value]) -> Result<Self, Error> {
                #![allow(non_snake_case)]
                let mut idx = 0;
                $( let $name = ok!($name::from_values_at(values, &mut idx)); )+
                if idx < values.len() {
                    return Err(Error::new(
                        ErrorKind::ArgumentError,
                        "too many arguments",
                    ));
                }
                Ok(($($name,)+))
            }
        }
    };
}

tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }
tuple_impls! { A B C D E }

/// Utility function to convert a slice of values into typed arguments.
///
/// This performs the same conversion that filters and functions perform.
///
/// ```
/// # use vinja::value::{from_args, Value};
/// # fn foo() -> Result<(), vinja::Error> {
/// # let args = vec![Value::from("foo"), Value::from(42i64)]; let args = &args[..];
/// // args is &[Value]
/// let (string, num): (String, i64) = from_args(args)?;
/// # Ok(()) } fn main() { foo().unwrap(); }
/// ```
#[inline(always)]
pub fn from_args<Args>(values: &[Value]) -> Result<Args, Error>
where
    Args: FunctionArgs,
{
    Args::from_values(values)
}

/// Splits off a trailing kwargs capsule from an argument slice.
pub(crate) fn split_kwargs(args: &[Value]) -> (&[Value], Option<&crate::value::ValueMap>) {
    if let Some(value) = args.last() {
        if let ValueRepr::Dict(ref map, crate::value::DictKind::Kwargs) = value.0 {
            return (&args[..args.len() - 1], Some(&**map));
        }
    }
    (args, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_basic_conversion() {
        let args = [Value::from("foo"), Value::from(42)];
        let (a, b): (String, i64) = from_args(&args).unwrap();
        assert_eq!(a, "foo");
        assert_eq!(b, 42);
    }

    #[test]
    fn test_optional() {
        let args = [Value::from(1)];
        let (a, b): (i64, Option<i64>) = from_args(&args).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, None);

        let args = [Value::from(1), Value::UNDEFINED];
        let (a, b): (i64, Option<i64>) = from_args(&args).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, None);
    }

    #[test]
    fn test_rest() {
        let args = [Value::from(1), Value::from(2), Value::from(3)];
        let (a, rest): (i64, Rest<i64>) = from_args(&args).unwrap();
        assert_eq!(a, 1);
        assert_eq!(rest.0, vec![2, 3]);
    }

    #[test]
    fn test_too_many() {
        let args = [Value::from(1), Value::from(2)];
        assert!(from_args::<(i64,)>(&args).is_err());
    }
}
