use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::compiler::instructions::Bytecode;
use crate::environment::Environment;
use crate::error::Error;
use crate::value::Value;
use crate::vm::Vm;

/// A handle to a compiled expression.
///
/// An expression is created via the
/// [`compile_expression`](Environment::compile_expression) method.  It
/// provides a method to evaluate the expression and return the result as
/// a value.  This is useful to express logic in configuration files or
/// similar things.
///
/// ```
/// # use vinja::{Environment, context};
/// let env = Environment::new();
/// let expr = env.compile_expression("number > 10 and number < 20").unwrap();
/// let rv = expr.eval(context!(number => 15)).unwrap();
/// assert!(rv.is_true());
/// ```
pub struct Expression<'env> {
    env: &'env Environment,
    bytecode: Arc<Bytecode>,
}

impl fmt::Debug for Expression<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression").finish()
    }
}

impl<'env> Expression<'env> {
    pub(crate) fn new(env: &'env Environment, bytecode: Arc<Bytecode>) -> Expression<'env> {
        Expression { env, bytecode }
    }

    /// Evaluates the expression with some context.
    ///
    /// The result of the expression is returned as [`Value`].
    pub fn eval<S: Serialize>(&self, ctx: S) -> Result<Value, Error> {
        Vm::new(self.env).eval_expression(self.bytecode.clone(), Value::from_serializable(&ctx))
    }
}
