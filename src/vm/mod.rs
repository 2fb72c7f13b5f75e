use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use crate::compiler::instructions::{
    Bytecode, Instr, LOOP_FLAG_RECURSIVE, LOOP_FLAG_WITH_LOOP_VAR, MACRO_CALLER,
};
use crate::compiler::ast::CmpOp;
use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::output::{CaptureMode, Output};
use crate::template::CompiledTemplate;
use crate::utils::AutoEscape;
use crate::value::callable::{Callable, MacroData};
use crate::value::{ops, UndefinedPolicy, Value, ValueMap, ValueRepr};
use crate::vm::context::{Context, Frame, Stack};
use crate::vm::loop_object::LoopState;
use crate::vm::state::BlockStack;

pub(crate) mod context;
mod loop_object;
pub(crate) mod state;

pub use self::state::State;

// the cost of a single include against the recursion limit.
const INCLUDE_RECURSION_COST: usize = 10;

// the cost of a single macro call against the recursion limit.
const MACRO_RECURSION_COST: usize = 4;

/// Executes bytecode against a context.
pub struct Vm<'env> {
    env: &'env Environment,
}

pub(crate) fn prepare_blocks(
    blocks: &BTreeMap<Arc<str>, Arc<Bytecode>>,
) -> BTreeMap<Arc<str>, BlockStack> {
    blocks
        .iter()
        .map(|(name, code)| (name.clone(), BlockStack::new(code.clone())))
        .collect()
}

fn undefined_error(value: &Value) -> Error {
    match value.undefined_name() {
        Some(name) => Error::new(ErrorKind::UndefinedError, format!("{name} is undefined")),
        None => Error::from(ErrorKind::UndefinedError),
    }
}

/// Truthiness with the strict undefined policy applied.
fn value_is_true(value: &Value) -> Result<bool, Error> {
    if value.undefined_policy() == Some(UndefinedPolicy::Strict) {
        Err(undefined_error(value))
    } else {
        Ok(value.is_true())
    }
}

fn assert_iterable(value: &Value) -> Result<(), Error> {
    if value.undefined_policy() == Some(UndefinedPolicy::Strict) {
        Err(undefined_error(value))
    } else {
        Ok(())
    }
}

impl<'env> Vm<'env> {
    /// Creates a new VM.
    pub fn new(env: &'env Environment) -> Vm<'env> {
        Vm { env }
    }

    /// Evaluates a compiled template against a root context value.
    ///
    /// It returns the last value left on the stack, which is used by the
    /// expression evaluation support.
    pub(crate) fn eval(
        &self,
        compiled: &CompiledTemplate,
        root: Value,
        out: &mut Output,
        auto_escape: AutoEscape,
    ) -> Result<Option<Value>, Error> {
        let mut state = State::new(
            Context::new_with_frame(self.env, Frame::new(root)),
            auto_escape,
            compiled.bytecode.clone(),
            prepare_blocks(&compiled.blocks),
        );
        self.eval_state(&mut state, out)
    }

    /// Evaluates a standalone expression bytecode.
    pub(crate) fn eval_expression(
        &self,
        bytecode: Arc<Bytecode>,
        root: Value,
    ) -> Result<Value, Error> {
        let mut state = State::new(
            Context::new_with_frame(self.env, Frame::new(root)),
            AutoEscape::None,
            bytecode,
            BTreeMap::new(),
        );
        let mut out = Output::null();
        self.eval_state(&mut state, &mut out)
            .map(|rv| rv.unwrap_or(Value::UNDEFINED))
    }

    /// Evaluates a macro body in a fresh context derived from its closure.
    pub(crate) fn eval_macro(
        &self,
        data: &MacroData,
        state: &State,
        out: &mut Output,
        locals: Vec<(Arc<str>, Value)>,
        caller: Option<Value>,
    ) -> Result<(), Error> {
        let mut ctx = Context::new_with_frame(self.env, Frame::new(data.base.clone()));
        ok!(ctx.push_frame(Frame::new(data.closure.clone())));
        let mut frame = Frame::default();
        for (key, value) in locals {
            frame.locals.insert(key, value);
        }
        if let Some(caller) = caller {
            frame.locals.insert(Arc::from("caller"), caller);
        }
        ok!(ctx.push_frame(frame));
        ok!(ctx.incr_depth(state.ctx.depth() + MACRO_RECURSION_COST));
        let mut macro_state = State::new(
            ctx,
            state.auto_escape(),
            data.bytecode.clone(),
            BTreeMap::new(),
        );
        self.eval_impl(&mut macro_state, out, Stack::default(), data.offset as usize)
            .map(|_| ())
    }

    #[inline(always)]
    fn eval_state(
        &self,
        state: &mut State<'env>,
        out: &mut Output,
    ) -> Result<Option<Value>, Error> {
        self.eval_impl(state, out, Stack::default(), 0)
    }

    fn eval_impl(
        &self,
        state: &mut State<'env>,
        out: &mut Output,
        mut stack: Stack,
        mut pc: usize,
    ) -> Result<Option<Value>, Error> {
        let initial_auto_escape = state.auto_escape;
        let mut auto_escape_stack = vec![];
        let mut next_loop_recursion_jump: Option<(usize, bool)> = None;
        let mut code = state.bytecode.clone();

        // If we are extending we are holding the bytecode of the target
        // parent template here.  This is used to detect multiple extends
        // and the evaluation uses it when it makes it to the end of the
        // child instructions.
        let mut parent_bytecode: Option<Arc<Bytecode>> = None;

        macro_rules! recurse_loop {
            ($capture:expr) => {{
                let jump_target = match state
                    .ctx
                    .current_loop()
                    .and_then(|l| l.object.recurse_jump_target)
                {
                    Some(target) => target as usize,
                    None => bail!(Error::new(
                        ErrorKind::TypeError,
                        "cannot recurse outside of recursive loop",
                    )),
                };
                // remember the next instruction as the loop exit jump
                // target; the loop pushed at jump_target picks it up.
                next_loop_recursion_jump = Some((pc + 1, $capture));
                if $capture {
                    out.begin_capture(CaptureMode::Capture);
                }
                pc = jump_target;
                continue;
            }};
        }

        loop {
            let instr = match code.get(pc) {
                Some(instr) => instr,
                None => {
                    // when an extends statement appeared in the template we
                    // continue evaluation with the parent instructions once
                    // the child template finished executing.
                    match parent_bytecode.take() {
                        Some(parent) => {
                            out.end_capture(AutoEscape::None);
                            state.bytecode = parent.clone();
                            code = parent;
                            pc = 0;
                            continue;
                        }
                        None => break,
                    }
                }
            };

            let a;
            let b;
            let mut err;

            macro_rules! bail {
                ($err:expr) => {{
                    err = $err;
                    process_err(&mut err, pc, state);
                    return Err(err);
                }};
            }

            macro_rules! ctx_ok {
                ($expr:expr) => {
                    match $expr {
                        Ok(rv) => rv,
                        Err(err) => bail!(err),
                    }
                };
            }

            macro_rules! func_binop {
                ($method:ident) => {{
                    b = stack.pop();
                    a = stack.pop();
                    stack.push(ctx_ok!(ops::$method(&a, &b)));
                }};
            }

            match instr {
                Instr::EmitText(idx) => {
                    ok!(out.write_str(code.string_at(*idx)).map_err(Error::from));
                }
                Instr::Output(count) => {
                    let count = *count as usize;
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        values.push(stack.pop());
                    }
                    for value in values.iter().rev() {
                        ctx_ok!(self.env.format(value, state, out));
                    }
                }
                Instr::LoadConst(idx) => {
                    stack.push(code.const_at(*idx).clone());
                }
                Instr::Lookup(idx) => {
                    let name = code.name_at(*idx);
                    stack.push(match state.lookup(name) {
                        Some(value) => value,
                        None => Value::undefined_named(name, self.env.undefined_policy()),
                    });
                }
                Instr::StoreVar(idx) => {
                    let name = code.name_at(*idx).clone();
                    a = stack.pop();
                    state.ctx.store(&name, a);
                }
                Instr::GetAttr(idx) => {
                    let name = code.name_at(*idx);
                    a = stack.pop();
                    if let Some(policy) = self.env.security_policy() {
                        if !policy.is_safe_attribute(&a, name) {
                            bail!(Error::new(
                                ErrorKind::SecurityError,
                                format!("access to attribute {name} is not allowed"),
                            ));
                        }
                    }
                    stack.push(match a.get_attr(name) {
                        Some(value) => value,
                        None => ctx_ok!(missing_attribute(self.env, &a, name)),
                    });
                }
                Instr::SetAttr(idx) => {
                    let name = code.name_at(*idx);
                    b = stack.pop();
                    a = stack.pop();
                    match b.as_object() {
                        Some(obj) => ctx_ok!(obj.set_attr(name, a)),
                        None => bail!(Error::new(
                            ErrorKind::TypeError,
                            format!("can only assign attributes on objects, not {}", b.kind()),
                        )),
                    }
                }
                Instr::GetItem => {
                    a = stack.pop();
                    b = stack.pop();
                    stack.push(match b.get_item(&a) {
                        Some(value) => value,
                        None => ctx_ok!(missing_item(self.env, &b, &a)),
                    });
                }
                Instr::Slice => {
                    let step = stack.pop();
                    let stop = stack.pop();
                    b = stack.pop();
                    a = stack.pop();
                    if a.undefined_policy() == Some(UndefinedPolicy::Strict) {
                        bail!(undefined_error(&a));
                    }
                    stack.push(ctx_ok!(ops::slice(a, b, stop, step)));
                }
                Instr::BuildList(count) => {
                    let count = *count as usize;
                    let mut v = Vec::with_capacity(crate::utils::untrusted_size_hint(count));
                    for _ in 0..count {
                        v.push(stack.pop());
                    }
                    v.reverse();
                    stack.push(Value::from(v));
                }
                Instr::BuildMap(pair_count) => {
                    let pair_count = *pair_count as usize;
                    let mut map = ValueMap::new();
                    stack.reverse_top(pair_count * 2);
                    for _ in 0..pair_count {
                        let key = stack.pop();
                        let value = stack.pop();
                        map.insert(key.as_dict_key(), value);
                    }
                    stack.push(Value::from_value_map(map));
                }
                Instr::BuildKwargs(pair_count) => {
                    let pair_count = *pair_count as usize;
                    let mut map = ValueMap::new();
                    stack.reverse_top(pair_count * 2);
                    for _ in 0..pair_count {
                        let key = stack.pop();
                        let value = stack.pop();
                        map.insert(key.as_dict_key(), value);
                    }
                    stack.push(Value::from_kwargs(map));
                }
                Instr::UnpackList(count) => {
                    ctx_ok!(self.unpack_list(&mut stack, *count as usize));
                }
                Instr::ListAppend => {
                    a = stack.pop();
                    b = stack.pop();
                    match b.0 {
                        ValueRepr::List(mut items) => {
                            Arc::make_mut(&mut items).push(a);
                            stack.push(Value(ValueRepr::List(items)));
                        }
                        _ => bail!(Error::new(
                            ErrorKind::TypeError,
                            "cannot append to non-list value",
                        )),
                    }
                }
                Instr::Add => func_binop!(add),
                Instr::Sub => func_binop!(sub),
                Instr::Mul => func_binop!(mul),
                Instr::Div => func_binop!(div),
                Instr::IntDiv => func_binop!(int_div),
                Instr::Rem => func_binop!(rem),
                Instr::Pow => func_binop!(pow),
                Instr::Neg => {
                    a = stack.pop();
                    stack.push(ctx_ok!(ops::neg(&a)));
                }
                Instr::Not => {
                    a = stack.pop();
                    stack.push(Value::from(!ctx_ok!(value_is_true(&a))));
                }
                Instr::StringConcat => {
                    a = stack.pop();
                    b = stack.pop();
                    stack.push(ops::string_concat(&b, &a));
                }
                Instr::Cmp(op) => {
                    b = stack.pop();
                    a = stack.pop();
                    stack.push(Value::from(match op {
                        CmpOp::Eq => a == b,
                        CmpOp::Ne => a != b,
                        CmpOp::Lt => a < b,
                        CmpOp::Lte => a <= b,
                        CmpOp::Gt => a > b,
                        CmpOp::Gte => a >= b,
                        CmpOp::In => {
                            ctx_ok!(assert_iterable(&a));
                            ctx_ok!(ops::contains(&b, &a)).is_true()
                        }
                        CmpOp::NotIn => {
                            ctx_ok!(assert_iterable(&a));
                            !ctx_ok!(ops::contains(&b, &a)).is_true()
                        }
                    }));
                }
                Instr::Jump(target) => {
                    pc = *target as usize;
                    continue;
                }
                Instr::JumpIfFalse(target) => {
                    a = stack.pop();
                    if !ctx_ok!(value_is_true(&a)) {
                        pc = *target as usize;
                        continue;
                    }
                }
                Instr::JumpIfFalseOrPop(target) => {
                    if !ctx_ok!(value_is_true(stack.peek())) {
                        pc = *target as usize;
                        continue;
                    } else {
                        stack.pop();
                    }
                }
                Instr::JumpIfTrueOrPop(target) => {
                    if ctx_ok!(value_is_true(stack.peek())) {
                        pc = *target as usize;
                        continue;
                    } else {
                        stack.pop();
                    }
                }
                Instr::PushLoop(flags) => {
                    a = stack.pop();
                    ctx_ok!(self.push_loop(
                        state,
                        a,
                        *flags,
                        pc,
                        next_loop_recursion_jump.take()
                    ));
                }
                Instr::Iterate(jump_target) => {
                    match state.ctx.current_loop().unwrap().next() {
                        Some(item) => stack.push(item),
                        None => {
                            pc = *jump_target as usize;
                            continue;
                        }
                    };
                }
                Instr::PushDidNotIterate => {
                    stack.push(Value::from(
                        state.ctx.current_loop().unwrap().did_not_iterate(),
                    ));
                }
                Instr::PushWith => {
                    ctx_ok!(state.ctx.push_frame(Frame::default()));
                }
                Instr::PopFrame => {
                    state.ctx.pop_frame();
                }
                Instr::PopLoopFrame => {
                    let mut frame = state.ctx.pop_frame();
                    if let Some(mut l) = frame.current_loop.take() {
                        if let Some((target, end_capture)) = l.current_recursion_jump.take() {
                            pc = target as usize;
                            if end_capture {
                                stack.push(out.end_capture(state.auto_escape));
                            }
                            continue;
                        }
                    }
                }
                Instr::PushAutoEscape => {
                    a = stack.pop();
                    auto_escape_stack.push(state.auto_escape);
                    state.auto_escape =
                        ctx_ok!(derive_auto_escape(a, initial_auto_escape));
                }
                Instr::PopAutoEscape => {
                    state.auto_escape = auto_escape_stack.pop().unwrap();
                }
                Instr::BeginCapture(mode) => {
                    out.begin_capture(*mode);
                }
                Instr::EndCapture => {
                    stack.push(out.end_capture(state.auto_escape));
                }
                Instr::ApplyFilter(name_idx, arg_count) => {
                    let name = code.name_at(*name_idx);
                    let filter = ctx_ok!(self.env.get_filter(name).ok_or_else(|| {
                        Error::new(ErrorKind::FilterError, format!("filter {name} is unknown"))
                    }));
                    let args = stack.get_call_args(*arg_count as usize);
                    a = ctx_ok!(filter.call(state, args));
                    stack.drop_top(*arg_count as usize);
                    stack.push(a);
                }
                Instr::PerformTest(name_idx, arg_count) => {
                    let name = code.name_at(*name_idx);
                    let test = ctx_ok!(self.env.get_test(name).ok_or_else(|| {
                        Error::new(ErrorKind::FilterError, format!("test {name} is unknown"))
                    }));
                    let args = stack.get_call_args(*arg_count as usize);
                    a = ctx_ok!(test.call(state, args));
                    stack.drop_top(*arg_count as usize);
                    stack.push(Value::from(a.is_true()));
                }
                Instr::CallFunction(name_idx, arg_count) => {
                    let name = code.name_at(*name_idx).clone();
                    let arg_count = *arg_count as usize;
                    // super is a special function reserved for super-ing
                    // into blocks.
                    let rv = if &*name == "super" {
                        if arg_count != 0 {
                            bail!(Error::new(
                                ErrorKind::ArgumentError,
                                "super() takes no arguments",
                            ));
                        }
                        ctx_ok!(self.perform_super(state, out, true))
                    } else if let Some(func) = state.lookup(&name) {
                        ctx_ok!(self.check_safe_call(&func));
                        let args = stack.get_call_args(arg_count);
                        let rv = ctx_ok!(func.call(state, args));
                        stack.drop_top(arg_count);
                        stack.push(rv);
                        pc += 1;
                        continue;
                    } else {
                        bail!(Error::new(
                            ErrorKind::NameError,
                            format!("{name} is unknown"),
                        ));
                    };
                    stack.push(rv);
                }
                Instr::CallMethod(name_idx, arg_count) => {
                    let name = code.name_at(*name_idx).clone();
                    let arg_count = *arg_count as usize;
                    let args = stack.get_call_args(arg_count);
                    if let Some(policy) = self.env.security_policy() {
                        if !policy.is_safe_attribute(&args[0], &name)
                            || policy.modifies_mutable(&args[0], &name)
                        {
                            bail!(Error::new(
                                ErrorKind::SecurityError,
                                format!("access to method {name} is not allowed"),
                            ));
                        }
                    }
                    a = ctx_ok!(args[0].call_method(state, &name, &args[1..]));
                    stack.drop_top(arg_count);
                    stack.push(a);
                }
                Instr::CallObject(arg_count) => {
                    let arg_count = *arg_count as usize;
                    let args = stack.get_call_args(arg_count);
                    ctx_ok!(self.check_safe_call(&args[0]));
                    a = ctx_ok!(args[0].call(state, &args[1..]));
                    stack.drop_top(arg_count);
                    stack.push(a);
                }
                Instr::DupTop => {
                    stack.push(stack.peek().clone());
                }
                Instr::DiscardTop => {
                    stack.pop();
                }
                Instr::Swap => {
                    a = stack.pop();
                    b = stack.pop();
                    stack.push(a);
                    stack.push(b);
                }
                Instr::Rot3 => {
                    let top = stack.pop();
                    let y = stack.pop();
                    let x = stack.pop();
                    stack.push(top);
                    stack.push(x);
                    stack.push(y);
                }
                Instr::FastSuper => {
                    ctx_ok!(self.perform_super(state, out, false));
                }
                Instr::FastRecurse => recurse_loop!(false),
                Instr::CallBlock(name_idx) => {
                    if parent_bytecode.is_none() && !out.is_discarding() {
                        let name = code.name_at(*name_idx).clone();
                        ctx_ok!(self.call_block(&name, state, out));
                    }
                }
                Instr::LoadBlocks => {
                    a = stack.pop();
                    if parent_bytecode.is_some() {
                        bail!(Error::new(
                            ErrorKind::TypeError,
                            "tried to extend a second time in a template",
                        ));
                    }
                    parent_bytecode = Some(ctx_ok!(self.load_blocks(a, state)));
                    out.begin_capture(CaptureMode::Discard);
                }
                Instr::Include {
                    ignore_missing,
                    with_context,
                } => {
                    a = stack.pop();
                    let lineno = code.get_line(pc).unwrap_or(0);
                    ctx_ok!(self.perform_include(
                        a,
                        state,
                        out,
                        *ignore_missing,
                        *with_context,
                        lineno,
                    ));
                }
                Instr::ImportModule => {
                    a = stack.pop();
                    let lineno = code.get_line(pc).unwrap_or(0);
                    stack.push(ctx_ok!(self.perform_import(a, state, lineno)));
                }
                Instr::BuildMacro(name_idx, offset, flags) => {
                    let defaults_value = stack.pop();
                    let names_value = stack.pop();
                    let arg_names = ctx_ok!(names_value.try_iter())
                        .map(|item| item.as_dict_key())
                        .collect();
                    let defaults = ctx_ok!(defaults_value.try_iter()).collect();
                    let name = code.name_at(*name_idx).clone();
                    let data = MacroData {
                        bytecode: code.clone(),
                        offset: *offset,
                        arg_names,
                        defaults,
                        closure: state.ctx.capture_locals(),
                        base: state.ctx.clone_base(),
                        caller_reference: flags & MACRO_CALLER != 0,
                    };
                    stack.push(Value(ValueRepr::Callable(Arc::new(Callable::new_macro(
                        name, data,
                    )))));
                }
                Instr::EmitDebug => {
                    ok!(write!(out, "{:#?}", state.ctx).map_err(Error::from));
                }
                Instr::Return => break,
            }
            pc += 1;
        }

        Ok(stack.try_pop())
    }

    fn check_safe_call(&self, func: &Value) -> Result<(), Error> {
        if let Some(policy) = self.env.security_policy() {
            let flagged_unsafe = func
                .as_callable()
                .map_or(false, |callable| callable.unsafe_call);
            if flagged_unsafe || !policy.is_safe_callable(func) {
                return Err(Error::new(
                    ErrorKind::SecurityError,
                    format!("{func} is not safely callable"),
                ));
            }
        }
        Ok(())
    }

    fn perform_include(
        &self,
        name: Value,
        state: &mut State<'env>,
        out: &mut Output,
        ignore_missing: bool,
        with_context: bool,
        lineno: usize,
    ) -> Result<(), Error> {
        let choices = match name.as_list() {
            Some(list) => list.iter().cloned().collect::<Vec<_>>(),
            None => vec![name.clone()],
        };

        let mut templates_tried = vec![];
        for choice in choices {
            let choice_name = match choice.as_str() {
                Some(name) => name.to_string(),
                None => {
                    return Err(Error::new(
                        ErrorKind::TypeError,
                        "template name was not a string",
                    ))
                }
            };
            let tmpl = match self.env.get_template(&choice_name) {
                Ok(tmpl) => tmpl,
                Err(err) => {
                    if err.kind() == ErrorKind::TemplateNotFound {
                        templates_tried.push(choice);
                    } else {
                        return Err(err);
                    }
                    continue;
                }
            };
            let compiled = tmpl.compiled().clone();
            let includer = state.bytecode.name().to_string();

            let rv = if with_context {
                ok!(state.ctx.push_frame(Frame::default()));
                ok!(state.ctx.incr_depth(INCLUDE_RECURSION_COST));
                let old_escape = mem::replace(
                    &mut state.auto_escape,
                    self.env.initial_auto_escape(&choice_name),
                );
                let old_code = mem::replace(&mut state.bytecode, compiled.bytecode.clone());
                let old_blocks =
                    mem::replace(&mut state.blocks, prepare_blocks(&compiled.blocks));
                let old_loaded = state.loaded_templates.clone();
                let rv = self.eval_state(state, out);
                state.loaded_templates = old_loaded;
                state.blocks = old_blocks;
                state.bytecode = old_code;
                state.auto_escape = old_escape;
                state.ctx.decr_depth(INCLUDE_RECURSION_COST);
                state.ctx.pop_frame();
                rv
            } else {
                let mut new_state = State::new(
                    Context::new_with_frame(self.env, Frame::new(Value::UNDEFINED)),
                    self.env.initial_auto_escape(&choice_name),
                    compiled.bytecode.clone(),
                    prepare_blocks(&compiled.blocks),
                );
                ok!(new_state
                    .ctx
                    .incr_depth(state.ctx.depth() + INCLUDE_RECURSION_COST));
                self.eval_state(&mut new_state, out)
            };
            ok!(rv.map(|_| ()).map_err(|mut err| {
                err.push_template_frame(&includer, lineno);
                err
            }));
            return Ok(());
        }
        if !templates_tried.is_empty() && !ignore_missing {
            Err(Error::new(
                ErrorKind::TemplateNotFound,
                if templates_tried.len() == 1 {
                    format!(
                        "tried to include non-existing template {:?}",
                        templates_tried[0]
                    )
                } else {
                    format!(
                        "tried to include one of multiple templates, none of which existed {}",
                        Value::from(templates_tried)
                    )
                },
            ))
        } else {
            Ok(())
        }
    }

    /// Evaluates a template as a module and returns its exports.
    fn perform_import(
        &self,
        name: Value,
        state: &State<'env>,
        lineno: usize,
    ) -> Result<Value, Error> {
        let name_str = match name.as_str() {
            Some(name) => name.to_string(),
            None => {
                return Err(Error::new(
                    ErrorKind::TypeError,
                    "template name was not a string",
                ))
            }
        };
        let tmpl = ok!(self.env.get_template(&name_str));
        let compiled = tmpl.compiled().clone();
        let mut module_state = State::new(
            Context::new_with_frame(self.env, Frame::new(Value::UNDEFINED)),
            self.env.initial_auto_escape(&name_str),
            compiled.bytecode.clone(),
            prepare_blocks(&compiled.blocks),
        );
        ok!(module_state
            .ctx
            .incr_depth(state.ctx.depth() + INCLUDE_RECURSION_COST));
        let mut out = Output::null();
        ok!(self
            .eval_state(&mut module_state, &mut out)
            .map_err(|mut err| {
                err.push_template_frame(state.bytecode.name(), lineno);
                err
            }));
        let mut map = ValueMap::new();
        for (key, value) in module_state.ctx.exports() {
            map.insert(key.clone(), value.clone());
        }
        Ok(Value::from_value_map(map))
    }

    fn perform_super(
        &self,
        state: &mut State<'env>,
        out: &mut Output,
        capture: bool,
    ) -> Result<Value, Error> {
        let name = ok!(state.current_block.clone().ok_or_else(|| {
            Error::new(ErrorKind::NameError, "cannot super outside of block")
        }));

        let block_stack = state.blocks.get_mut(&name).unwrap();
        if !block_stack.push() {
            return Err(Error::new(ErrorKind::NameError, "no parent block exists"));
        }
        let block_code = block_stack.bytecode();

        if capture {
            out.begin_capture(CaptureMode::Capture);
        }

        let old_code = mem::replace(&mut state.bytecode, block_code);
        ok!(state.ctx.push_frame(Frame::default()));
        let rv = self.eval_state(state, out);
        state.ctx.pop_frame();
        state.bytecode = old_code;
        state.blocks.get_mut(&name).unwrap().pop();

        ok!(rv.map_err(|mut err| {
            err.push_template_frame(state.bytecode.name(), 0);
            err
        }));
        if capture {
            Ok(out.end_capture(state.auto_escape))
        } else {
            Ok(Value::UNDEFINED)
        }
    }

    fn load_blocks(
        &self,
        name: Value,
        state: &mut State<'env>,
    ) -> Result<Arc<Bytecode>, Error> {
        let name_str = match name.as_str() {
            Some(name) => name.to_string(),
            None => {
                return Err(Error::new(
                    ErrorKind::TypeError,
                    "template name was not a string",
                ))
            }
        };
        if state.loaded_templates.contains(&name_str as &str) {
            return Err(Error::new(
                ErrorKind::TypeError,
                format!(
                    "cycle in template inheritance. {name_str:?} was referenced more than once"
                ),
            ));
        }
        let tmpl = ok!(self.env.get_template(&name_str));
        let compiled = tmpl.compiled().clone();
        state.loaded_templates.insert(compiled.name.clone());
        for (block_name, code) in compiled.blocks.iter() {
            state
                .blocks
                .entry(block_name.clone())
                .or_default()
                .append_bytecode(code.clone());
        }
        Ok(compiled.bytecode.clone())
    }

    pub(crate) fn call_block(
        &self,
        name: &Arc<str>,
        state: &mut State<'env>,
        out: &mut Output,
    ) -> Result<Option<Value>, Error> {
        if let Some(block_stack) = state.blocks.get(name) {
            let block_code = block_stack.bytecode();
            let old_block = mem::replace(&mut state.current_block, Some(name.clone()));
            let old_code = mem::replace(&mut state.bytecode, block_code);
            ok!(state.ctx.push_frame(Frame::default()));
            let rv = self.eval_state(state, out);
            state.ctx.pop_frame();
            state.bytecode = old_code;
            state.current_block = old_block;
            rv
        } else {
            Err(Error::new(
                ErrorKind::NameError,
                format!("block '{name}' not found"),
            ))
        }
    }

    fn push_loop(
        &self,
        state: &mut State<'env>,
        iterable: Value,
        flags: u8,
        pc: usize,
        current_recursion_jump: Option<(usize, bool)>,
    ) -> Result<(), Error> {
        ok!(assert_iterable(&iterable));
        let iter = ok!(iterable.try_iter());
        let depth = state
            .ctx
            .current_loop()
            .filter(|l| l.object.recurse_jump_target.is_some())
            .map_or(0, |l| l.object.depth + 1);
        let recursive = flags & LOOP_FLAG_RECURSIVE != 0;
        let with_loop_var = flags & LOOP_FLAG_WITH_LOOP_VAR != 0;
        state.ctx.push_frame(Frame {
            current_loop: Some(LoopState::new(
                iter,
                depth,
                with_loop_var,
                recursive.then_some(pc as u32),
                current_recursion_jump.map(|(target, capture)| (target as u32, capture)),
            )),
            ..Frame::default()
        })
    }

    fn unpack_list(&self, stack: &mut Stack, count: usize) -> Result<(), Error> {
        let top = stack.pop();
        ok!(assert_iterable(&top));
        let iter = ok!(top.try_iter().map_err(|_| {
            Error::new(ErrorKind::TypeError, "cannot unpack non-iterable value")
        }));

        let mut n = 0;
        for item in iter {
            stack.push(item);
            n += 1;
        }

        if n == count {
            stack.reverse_top(n);
            Ok(())
        } else {
            stack.drop_top(n);
            Err(Error::new(
                ErrorKind::TypeError,
                format!("sequence of wrong length (expected {count}, got {n})"),
            ))
        }
    }
}

fn missing_attribute(env: &Environment, parent: &Value, name: &str) -> Result<Value, Error> {
    if parent.is_undefined() {
        let policy = parent.undefined_policy().unwrap();
        match policy {
            UndefinedPolicy::Strict => Err(undefined_error(parent)),
            UndefinedPolicy::Lenient => Ok(Value::undefined_named(name, policy)),
            UndefinedPolicy::Chainable | UndefinedPolicy::Debug => {
                let chained = match parent.undefined_name() {
                    Some(prev) => format!("{prev}.{name}"),
                    None => name.to_string(),
                };
                Ok(Value::undefined_named(&chained, policy))
            }
        }
    } else {
        Ok(Value::undefined_named(name, env.undefined_policy()))
    }
}

fn missing_item(env: &Environment, parent: &Value, key: &Value) -> Result<Value, Error> {
    missing_attribute(env, parent, &key.to_string())
}

fn derive_auto_escape(
    value: Value,
    initial_auto_escape: AutoEscape,
) -> Result<AutoEscape, Error> {
    match (value.as_str(), value == Value::from(true)) {
        (Some("html"), _) => Ok(AutoEscape::Html),
        (Some("none"), _) | (None, false) => Ok(AutoEscape::None),
        (None, true) => Ok(if matches!(initial_auto_escape, AutoEscape::None) {
            AutoEscape::Html
        } else {
            initial_auto_escape
        }),
        _ => Err(Error::new(
            ErrorKind::TypeError,
            "invalid value to autoescape tag",
        )),
    }
}

#[inline(never)]
#[cold]
fn process_err(err: &mut Error, pc: usize, state: &State) {
    // only attach line information if the error does not have it yet.
    if err.line().is_none() {
        let lineno = state.bytecode.get_line(pc).unwrap_or(0);
        err.set_filename_and_line(state.bytecode.name(), lineno);
    }
}
