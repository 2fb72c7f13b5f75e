use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::compiler::instructions::Bytecode;
use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::utils::AutoEscape;
use crate::value::{UndefinedPolicy, Value};
use crate::vm::context::Context;

/// Provides access to the current execution state of the engine.
///
/// A read only reference is passed to filter functions and similar objects
/// to allow limited interfacing with the engine.  The state is useful to
/// look up information about the engine in filter, test or global
/// functions.  It not only provides access to the template environment but
/// also the context variables of the engine and the current auto escaping
/// behavior.
pub struct State<'env> {
    pub(crate) ctx: Context<'env>,
    pub(crate) current_block: Option<Arc<str>>,
    pub(crate) auto_escape: AutoEscape,
    pub(crate) bytecode: Arc<Bytecode>,
    pub(crate) blocks: BTreeMap<Arc<str>, BlockStack>,
    pub(crate) loaded_templates: BTreeSet<Arc<str>>,
}

impl fmt::Debug for State<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.bytecode.name())
            .field("current_block", &self.current_block)
            .field("auto_escape", &self.auto_escape)
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl<'env> State<'env> {
    pub(crate) fn new(
        ctx: Context<'env>,
        auto_escape: AutoEscape,
        bytecode: Arc<Bytecode>,
        blocks: BTreeMap<Arc<str>, BlockStack>,
    ) -> State<'env> {
        State {
            ctx,
            current_block: None,
            auto_escape,
            bytecode,
            blocks,
            loaded_templates: BTreeSet::new(),
        }
    }

    /// Creates an empty state for an environment.
    pub(crate) fn new_for_env(env: &'env Environment) -> State<'env> {
        State::new(
            Context::new(env),
            AutoEscape::None,
            Arc::new(Bytecode::new("<unknown>")),
            BTreeMap::new(),
        )
    }

    /// Returns a reference to the current environment.
    #[inline(always)]
    pub fn env(&self) -> &'env Environment {
        self.ctx.env()
    }

    /// Returns the name of the current template.
    pub fn name(&self) -> &str {
        self.bytecode.name()
    }

    /// Returns the current value of the auto escape flag.
    #[inline(always)]
    pub fn auto_escape(&self) -> AutoEscape {
        self.auto_escape
    }

    /// Returns the environment's undefined policy.
    #[inline(always)]
    pub fn undefined_policy(&self) -> UndefinedPolicy {
        self.env().undefined_policy()
    }

    /// Returns the name of the innermost block.
    #[inline(always)]
    pub fn current_block(&self) -> Option<&str> {
        self.current_block.as_deref()
    }

    /// Looks up a variable by name in the context.
    #[inline(always)]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.ctx.load(name)
    }

    /// Invokes a filter with some arguments.
    ///
    /// ```
    /// # use vinja::Environment;
    /// # let env = Environment::new();
    /// # let state = env.empty_state();
    /// let rv = state.apply_filter("upper", &["hello world".into()]).unwrap();
    /// assert_eq!(rv.as_str(), Some("HELLO WORLD"));
    /// ```
    pub fn apply_filter(&self, filter: &str, args: &[Value]) -> Result<Value, Error> {
        match self.env().get_filter(filter) {
            Some(filter) => filter.call(self, args),
            None => Err(Error::new(
                ErrorKind::FilterError,
                format!("filter {filter} is unknown"),
            )),
        }
    }

    /// Invokes a test function on a value.
    ///
    /// ```
    /// # use vinja::Environment;
    /// # let env = Environment::new();
    /// # let state = env.empty_state();
    /// let rv = state.perform_test("even", &[42i64.into()]).unwrap();
    /// assert!(rv);
    /// ```
    pub fn perform_test(&self, test: &str, args: &[Value]) -> Result<bool, Error> {
        match self.env().get_test(test) {
            Some(test) => test.call(self, args).map(|x| x.is_true()),
            None => Err(Error::new(
                ErrorKind::FilterError,
                format!("test {test} is unknown"),
            )),
        }
    }

    /// Returns a list of all known variables.
    pub fn known_variables(&self) -> Vec<String> {
        self.ctx.known_variables().into_keys().collect()
    }
}

/// Tracks a block and its parents for `super()`.
#[derive(Default)]
pub(crate) struct BlockStack {
    codes: Vec<Arc<Bytecode>>,
    depth: usize,
}

impl BlockStack {
    pub fn new(code: Arc<Bytecode>) -> BlockStack {
        BlockStack {
            codes: vec![code],
            depth: 0,
        }
    }

    pub fn bytecode(&self) -> Arc<Bytecode> {
        self.codes[self.depth].clone()
    }

    pub fn push(&mut self) -> bool {
        if self.depth + 1 < self.codes.len() {
            self.depth += 1;
            true
        } else {
            false
        }
    }

    #[track_caller]
    pub fn pop(&mut self) {
        self.depth = self.depth.checked_sub(1).unwrap()
    }

    pub fn append_bytecode(&mut self, code: Arc<Bytecode>) {
        self.codes.push(code);
    }
}
