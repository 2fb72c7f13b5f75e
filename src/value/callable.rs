use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::compiler::instructions::Bytecode;
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::utils::AutoEscape;
use crate::value::argtypes::split_kwargs;
use crate::value::Value;
use crate::vm::{State, Vm};

/// The kind of a callable value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CallableKind {
    /// A plain function.
    Function,
    /// A template macro.
    Macro,
    /// A filter applied with the `|` operator.
    Filter,
    /// A test applied with the `is` operator.
    Test,
}

impl fmt::Display for CallableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallableKind::Function => "function",
            CallableKind::Macro => "macro",
            CallableKind::Filter => "filter",
            CallableKind::Test => "test",
        })
    }
}

type NativeFunc = dyn Fn(&State, &[Value]) -> Result<Value, Error> + Send + Sync;

/// The body of a macro defined in a template.
pub(crate) struct MacroData {
    /// The bytecode that holds the macro body.
    pub bytecode: Arc<Bytecode>,
    /// Instruction offset of the macro body.
    pub offset: u32,
    /// Names of the declared arguments.
    pub arg_names: Vec<Arc<str>>,
    /// Default values aligned with the tail of `arg_names`.
    pub defaults: Vec<Value>,
    /// Snapshot of the locals visible at definition time.
    pub closure: Value,
    /// The root context value of the defining template.
    pub base: Value,
    /// Whether the macro body references `caller()`.
    pub caller_reference: bool,
}

enum CallableImpl {
    Native(Box<NativeFunc>),
    Macro(MacroData),
}

/// A named callable value.
///
/// Callables back functions, macros, filters and tests.  They carry safety
/// flags consulted by the sandbox and a purity flag consulted by the
/// optimizer.
pub struct Callable {
    name: Arc<str>,
    kind: CallableKind,
    pub(crate) unsafe_call: bool,
    pub(crate) alters_data: bool,
    pub(crate) pure: bool,
    imp: CallableImpl,
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.kind, self.name)
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.kind, self.name)
    }
}

impl Callable {
    /// Creates a callable from a native function.
    pub(crate) fn new_native<F>(name: &str, kind: CallableKind, f: F) -> Callable
    where
        F: Fn(&State, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Callable {
            name: Arc::from(name),
            kind,
            unsafe_call: false,
            alters_data: false,
            pure: false,
            imp: CallableImpl::Native(Box::new(f)),
        }
    }

    /// Creates a callable from a macro body.
    pub(crate) fn new_macro(name: Arc<str>, data: MacroData) -> Callable {
        Callable {
            name,
            kind: CallableKind::Macro,
            unsafe_call: false,
            alters_data: false,
            pure: false,
            imp: CallableImpl::Macro(data),
        }
    }

    /// Marks the callable as safe for constant folding.
    pub(crate) fn mark_pure(mut self) -> Callable {
        self.pure = true;
        self
    }

    /// Marks the callable as unsafe to invoke from sandboxed templates.
    #[allow(unused)]
    pub(crate) fn mark_unsafe(mut self) -> Callable {
        self.unsafe_call = true;
        self
    }

    /// The name of the callable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The kind of the callable.
    pub fn kind(&self) -> CallableKind {
        self.kind
    }

    /// True if the callable may be folded at compile time.
    pub fn is_pure(&self) -> bool {
        self.pure
    }

    /// True if the sandbox must refuse to invoke this callable.
    pub fn is_unsafe(&self) -> bool {
        self.unsafe_call
    }

    /// True if invoking the callable mutates data.
    pub fn alters_data(&self) -> bool {
        self.alters_data
    }

    /// The names of the declared macro arguments, if this is a macro.
    pub fn arg_names(&self) -> Option<Vec<&str>> {
        match self.imp {
            CallableImpl::Macro(ref data) => {
                Some(data.arg_names.iter().map(|x| x as &str).collect())
            }
            CallableImpl::Native(_) => None,
        }
    }

    /// Calls the callable.
    pub fn call(&self, state: &State, args: &[Value]) -> Result<Value, Error> {
        match self.imp {
            CallableImpl::Native(ref f) => f(state, args),
            CallableImpl::Macro(ref data) => self.call_macro(data, state, args),
        }
    }

    fn call_macro(&self, data: &MacroData, state: &State, args: &[Value]) -> Result<Value, Error> {
        let (args, kwargs) = split_kwargs(args);

        if args.len() > data.arg_names.len() {
            return Err(Error::new(
                ErrorKind::ArgumentError,
                format!("macro {} received too many arguments", self.name),
            ));
        }

        let mut kwargs_used = BTreeSet::new();
        let mut locals = Vec::with_capacity(data.arg_names.len());
        let defaults_offset = data.arg_names.len() - data.defaults.len();
        for (idx, name) in data.arg_names.iter().enumerate() {
            let kwarg = kwargs.and_then(|kwargs| kwargs.get(&**name));
            let value = match (args.get(idx), kwarg) {
                (Some(_), Some(_)) => {
                    return Err(Error::new(
                        ErrorKind::ArgumentError,
                        format!("duplicate argument `{name}`"),
                    ))
                }
                (Some(arg), None) => arg.clone(),
                (None, Some(kwarg)) => {
                    kwargs_used.insert(&**name);
                    kwarg.clone()
                }
                (None, None) => match idx.checked_sub(defaults_offset) {
                    Some(default_idx) => data.defaults[default_idx].clone(),
                    None => Value::UNDEFINED,
                },
            };
            locals.push((name.clone(), value));
        }

        let mut caller = None;
        if let Some(kwargs) = kwargs {
            for key in kwargs.keys() {
                if &**key == "caller" && data.caller_reference {
                    caller = kwargs.get(&**key).cloned();
                } else if !kwargs_used.contains(&**key) {
                    return Err(Error::new(
                        ErrorKind::ArgumentError,
                        format!("unknown keyword argument `{key}`"),
                    ));
                }
            }
        }

        let vm = Vm::new(state.env());
        let mut rv = String::new();
        let mut out = Output::with_string(&mut rv);
        ok!(vm
            .eval_macro(data, state, &mut out, locals, caller)
            .map_err(|mut err| {
                err.push_template_frame(state.name(), 0);
                err
            }));

        Ok(if !matches!(state.auto_escape(), AutoEscape::None) {
            Value::from_safe_string(rv)
        } else {
            Value::from(rv)
        })
    }
}
