use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueMap};
use crate::vm::loop_object::LoopState;

pub(crate) type Locals = BTreeMap<Arc<str>, Value>;

pub(crate) struct Frame {
    pub locals: Locals,
    pub ctx: Value,
    pub current_loop: Option<LoopState>,
}

impl Default for Frame {
    fn default() -> Frame {
        Frame::new(Value::UNDEFINED)
    }
}

impl Frame {
    /// Creates a new frame with the given context value.
    pub fn new(ctx: Value) -> Frame {
        Frame {
            locals: Locals::new(),
            ctx,
            current_loop: None,
        }
    }
}

/// The value stack of the VM.
pub(crate) struct Stack {
    values: Vec<Value>,
}

impl Default for Stack {
    fn default() -> Stack {
        Stack {
            values: Vec::with_capacity(16),
        }
    }
}

impl Stack {
    pub fn push(&mut self, arg: Value) {
        self.values.push(arg);
    }

    #[track_caller]
    pub fn pop(&mut self) -> Value {
        self.values.pop().unwrap()
    }

    pub fn reverse_top(&mut self, n: usize) {
        let start = self.values.len() - n;
        self.values[start..].reverse();
    }

    pub fn get_call_args(&self, n: usize) -> &[Value] {
        &self.values[self.values.len() - n..]
    }

    pub fn drop_top(&mut self, n: usize) {
        self.values.truncate(self.values.len() - n);
    }

    pub fn try_pop(&mut self) -> Option<Value> {
        self.values.pop()
    }

    #[track_caller]
    pub fn peek(&self) -> &Value {
        self.values.last().unwrap()
    }
}

impl From<Vec<Value>> for Stack {
    fn from(values: Vec<Value>) -> Stack {
        Stack { values }
    }
}

/// The scope chain the VM resolves names against.
pub(crate) struct Context<'env> {
    env: &'env Environment,
    stack: Vec<Frame>,
    outer_stack_depth: usize,
    recursion_limit: usize,
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.known_variables()).finish()
    }
}

impl<'env> Context<'env> {
    /// Creates an empty context.
    pub fn new(env: &'env Environment) -> Context<'env> {
        Context {
            env,
            stack: Vec::with_capacity(8),
            outer_stack_depth: 0,
            recursion_limit: env.recursion_limit(),
        }
    }

    /// Creates a context with an initial frame.
    pub fn new_with_frame(env: &'env Environment, frame: Frame) -> Context<'env> {
        let mut rv = Context::new(env);
        rv.stack.push(frame);
        rv
    }

    /// The environment of the context.
    #[inline(always)]
    pub fn env(&self) -> &'env Environment {
        self.env
    }

    /// Stores a variable in the topmost frame.
    pub fn store(&mut self, key: &str, value: Value) {
        self.stack
            .last_mut()
            .unwrap()
            .locals
            .insert(Arc::from(key), value);
    }

    /// Looks up a variable in the context.
    pub fn load(&self, key: &str) -> Option<Value> {
        for frame in self.stack.iter().rev() {
            // look at locals first
            if let Some(value) = frame.locals.get(key) {
                return Some(value.clone());
            }

            // if we are a loop, check if we are looking up the special loop var.
            if let Some(ref l) = frame.current_loop {
                if l.with_loop_var && key == "loop" {
                    return Some(Value::from_dyn_object(l.object.clone()));
                }
            }

            // perform a lookup on the context value of the frame.  This
            // does not produce errors if the context is of the wrong type.
            if let Some(rv) = frame.ctx.get_attr(key) {
                return Some(rv);
            }
        }

        self.env.get_global(key)
    }

    /// Returns the base context value.
    pub fn clone_base(&self) -> Value {
        self.stack
            .first()
            .map(|x| x.ctx.clone())
            .unwrap_or_default()
    }

    /// Captures all visible locals into a single map.
    ///
    /// Macros snapshot the scope they were defined in with this.
    pub fn capture_locals(&self) -> Value {
        let mut rv = ValueMap::new();
        for frame in self.stack.iter() {
            for (key, value) in frame.locals.iter() {
                rv.insert(key.clone(), value.clone());
            }
        }
        Value::from_value_map(rv)
    }

    /// Returns all variables and their values visible in the context.
    pub fn known_variables(&self) -> BTreeMap<String, Value> {
        let mut rv = BTreeMap::new();
        for frame in self.stack.iter().rev() {
            for (key, value) in frame.locals.iter() {
                rv.entry(key.to_string()).or_insert_with(|| value.clone());
            }
            if let Some(ref l) = frame.current_loop {
                if l.with_loop_var {
                    rv.entry("loop".to_string())
                        .or_insert_with(|| Value::from_dyn_object(l.object.clone()));
                }
            }
            if let Some(map) = frame.ctx.as_dict() {
                for (key, value) in map.iter() {
                    rv.entry(key.to_string()).or_insert_with(|| value.clone());
                }
            }
        }
        for (key, value) in self.env.globals() {
            rv.entry(key.to_string()).or_insert(value);
        }
        rv
    }

    /// Pushes a new frame.
    pub fn push_frame(&mut self, frame: Frame) -> Result<(), Error> {
        ok!(self.check_depth());
        self.stack.push(frame);
        Ok(())
    }

    /// Pops the topmost frame.
    #[track_caller]
    pub fn pop_frame(&mut self) -> Frame {
        self.stack.pop().unwrap()
    }

    /// Returns the locals of the bottom frame (the template's exports).
    #[track_caller]
    pub fn exports(&self) -> &Locals {
        &self.stack.first().unwrap().locals
    }

    /// Returns the current innermost loop state.
    pub fn current_loop(&mut self) -> Option<&mut LoopState> {
        self.stack
            .iter_mut()
            .rev()
            .find_map(|x| x.current_loop.as_mut())
    }

    /// The real depth of the context.
    pub fn depth(&self) -> usize {
        self.outer_stack_depth + self.stack.len()
    }

    /// Increase the stack depth.
    pub fn incr_depth(&mut self, delta: usize) -> Result<(), Error> {
        self.outer_stack_depth += delta;
        self.check_depth()
    }

    /// Decrease the stack depth.
    pub fn decr_depth(&mut self, delta: usize) {
        self.outer_stack_depth -= delta;
    }

    fn check_depth(&self) -> Result<(), Error> {
        if self.depth() > self.recursion_limit {
            return Err(Error::new(
                ErrorKind::RecursionLimit,
                "recursion limit exceeded",
            ));
        }
        Ok(())
    }
}
