use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, ErrorKind};
use crate::value::{Object, Value, ValueIter};
use crate::vm::state::State;

/// The synthetic `loop` variable.
///
/// A single record per loop is updated between iterations rather than
/// allocating a fresh object each time around.
pub(crate) struct Loop {
    pub len: usize,
    pub idx: AtomicUsize,
    pub depth: usize,
    pub has_next: AtomicBool,
    pub prev_item: Mutex<Value>,
    pub next_item: Mutex<Value>,
    pub last_changed_value: Mutex<Option<Vec<Value>>>,
    pub recurse_jump_target: Option<u32>,
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Loop");
        for attr in [
            "index", "index0", "revindex", "revindex0", "first", "last", "length", "depth",
            "depth0",
        ] {
            s.field(attr, &self.get_attr(attr).unwrap());
        }
        s.finish()
    }
}

impl Object for Loop {
    fn type_name(&self) -> &'static str {
        "loop"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        let idx = self.idx.load(Ordering::Relaxed) as u64;
        let len = self.len as u64;
        match name {
            "index0" => Some(Value::from(idx)),
            "index" => Some(Value::from(idx + 1)),
            "length" => Some(Value::from(len)),
            "revindex" => Some(Value::from(len.saturating_sub(idx))),
            "revindex0" => Some(Value::from(len.saturating_sub(idx).saturating_sub(1))),
            "first" => Some(Value::from(idx == 0)),
            "last" => Some(Value::from(!self.has_next.load(Ordering::Relaxed))),
            "previtem" => Some(self.prev_item.lock().unwrap().clone()),
            "nextitem" => Some(self.next_item.lock().unwrap().clone()),
            "depth" => Some(Value::from(self.depth + 1)),
            "depth0" => Some(Value::from(self.depth)),
            _ => None,
        }
    }

    fn call(&self, _state: &State, _args: &[Value]) -> Result<Value, Error> {
        Err(Error::new(
            ErrorKind::TypeError,
            "loop cannot be called if reassigned to different variable",
        ))
    }

    fn call_method(&self, _state: &State, name: &str, args: &[Value]) -> Result<Value, Error> {
        if name == "changed" {
            let mut last_changed_value = self.last_changed_value.lock().unwrap();
            let value = args.to_owned();
            let changed = last_changed_value.as_ref() != Some(&value);
            if changed {
                *last_changed_value = Some(value);
                Ok(Value::from(true))
            } else {
                Ok(Value::from(false))
            }
        } else if name == "cycle" {
            if args.is_empty() {
                return Err(Error::new(
                    ErrorKind::ArgumentError,
                    "cycle requires at least one argument",
                ));
            }
            let idx = self.idx.load(Ordering::Relaxed);
            Ok(args[idx % args.len()].clone())
        } else {
            Err(Error::new(
                ErrorKind::AttributeError,
                format!("loop object has no method named {name}"),
            ))
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<loop {}/{}>",
            self.idx.load(Ordering::Relaxed),
            self.len
        )
    }
}

/// The engine side state of one loop.
pub(crate) struct LoopState {
    pub with_loop_var: bool,
    pub current_recursion_jump: Option<(u32, bool)>,
    pub object: Arc<Loop>,
    iter: ValueIter,
    buffered: Option<Value>,
    current_item: Value,
    started: bool,
}

impl LoopState {
    pub fn new(
        mut iter: ValueIter,
        depth: usize,
        with_loop_var: bool,
        recurse_jump_target: Option<u32>,
        current_recursion_jump: Option<(u32, bool)>,
    ) -> LoopState {
        let len = iter.len();
        let buffered = iter.next();
        LoopState {
            with_loop_var,
            current_recursion_jump,
            object: Arc::new(Loop {
                len,
                idx: AtomicUsize::new(0),
                depth,
                has_next: AtomicBool::new(buffered.is_some()),
                prev_item: Mutex::new(Value::UNDEFINED),
                next_item: Mutex::new(Value::UNDEFINED),
                last_changed_value: Mutex::new(None),
                recurse_jump_target,
            }),
            iter,
            buffered,
            current_item: Value::UNDEFINED,
            started: false,
        }
    }

    /// Advances the loop, updating the loop record.
    pub fn next(&mut self) -> Option<Value> {
        let current = some!(self.buffered.take());
        self.buffered = self.iter.next();

        if self.started {
            self.object.idx.fetch_add(1, Ordering::Relaxed);
        }
        self.started = true;
        *self.object.prev_item.lock().unwrap() =
            std::mem::replace(&mut self.current_item, current.clone());
        self.object
            .has_next
            .store(self.buffered.is_some(), Ordering::Relaxed);
        *self.object.next_item.lock().unwrap() =
            self.buffered.clone().unwrap_or(Value::UNDEFINED);
        Some(current)
    }

    /// True if the loop never produced an item.
    pub fn did_not_iterate(&self) -> bool {
        !self.started
    }
}
