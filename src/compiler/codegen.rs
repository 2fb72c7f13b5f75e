use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compiler::ast;
use crate::compiler::instructions::{
    Bytecode, Instr, LOOP_FLAG_RECURSIVE, LOOP_FLAG_WITH_LOOP_VAR, MACRO_CALLER,
};
use crate::compiler::tokens::Span;
use crate::error::Error;
use crate::output::CaptureMode;
use crate::value::Value;

/// Represents an open block of code that does not yet have updated
/// jump targets.
enum PendingBlock {
    Branch(usize),
    Loop {
        iter_instr: usize,
        break_jumps: Vec<usize>,
    },
    ScBool(Vec<usize>),
}

/// Provides a convenient interface to creating instructions for the VM.
pub struct CodeGenerator {
    code: Bytecode,
    blocks: BTreeMap<Arc<str>, Bytecode>,
    pending_block: Vec<PendingBlock>,
    current_line: u32,
    // number of scope frames opened inside each enclosing loop; break and
    // continue must pop them before jumping.
    loop_frame_depth: Vec<usize>,
}

impl CodeGenerator {
    /// Creates a new code generator.
    pub fn new(name: &str) -> CodeGenerator {
        CodeGenerator {
            code: Bytecode::new(name),
            blocks: BTreeMap::new(),
            pending_block: Vec::new(),
            current_line: 0,
            loop_frame_depth: Vec::new(),
        }
    }

    /// Sets the current location's line.
    pub fn set_line(&mut self, lineno: u32) {
        self.current_line = lineno;
    }

    /// Sets line from span.
    pub fn set_line_from_span(&mut self, span: Span) {
        self.set_line(span.start_line);
    }

    /// Add a simple instruction with the current location.
    pub fn add(&mut self, instr: Instr) -> usize {
        self.code.add_with_line(instr, self.current_line)
    }

    /// Returns the next instruction index.
    pub fn next_instruction(&self) -> usize {
        self.code.len()
    }

    /// Creates a sub generator for an inheritance block.
    fn new_subgenerator(&self) -> CodeGenerator {
        let mut sub = CodeGenerator::new(self.code.name());
        sub.current_line = self.current_line;
        sub
    }

    /// Finishes a sub generator and syncs it back.
    fn finish_subgenerator(&mut self, sub: CodeGenerator) -> Bytecode {
        self.current_line = sub.current_line;
        let (code, blocks) = sub.finish();
        self.blocks.extend(blocks);
        code
    }

    fn open_frame(&mut self) {
        if let Some(depth) = self.loop_frame_depth.last_mut() {
            *depth += 1;
        }
    }

    fn close_frame(&mut self) {
        if let Some(depth) = self.loop_frame_depth.last_mut() {
            *depth -= 1;
        }
    }

    /// Starts a for loop.
    pub fn start_for_loop(&mut self, with_loop_var: bool, recursive: bool) {
        let mut flags = 0;
        if with_loop_var {
            flags |= LOOP_FLAG_WITH_LOOP_VAR;
        }
        if recursive {
            flags |= LOOP_FLAG_RECURSIVE;
        }
        self.add(Instr::PushLoop(flags));
        let iter_instr = self.add(Instr::Iterate(!0));
        self.pending_block.push(PendingBlock::Loop {
            iter_instr,
            break_jumps: Vec::new(),
        });
        self.loop_frame_depth.push(0);
    }

    /// Ends the open for loop.
    pub fn end_for_loop(&mut self, push_did_iterate: bool) {
        match self.pending_block.pop() {
            Some(PendingBlock::Loop {
                iter_instr,
                break_jumps,
            }) => {
                self.loop_frame_depth.pop();
                self.add(Instr::Jump(iter_instr as u32));
                let loop_end = self.next_instruction();
                if push_did_iterate {
                    self.add(Instr::PushDidNotIterate);
                }
                self.add(Instr::PopLoopFrame);
                if let Some(Instr::Iterate(ref mut jump_target)) = self.code.get_mut(iter_instr) {
                    *jump_target = loop_end as u32;
                } else {
                    unreachable!("did not find iteration instruction");
                }
                for break_jump in break_jumps {
                    if let Some(Instr::Jump(ref mut target)) = self.code.get_mut(break_jump) {
                        *target = loop_end as u32;
                    }
                }
            }
            _ => unreachable!("not inside a loop"),
        }
    }

    /// Begins an if conditional.
    pub fn start_if(&mut self) {
        let jump_instr = self.add(Instr::JumpIfFalse(!0));
        self.pending_block.push(PendingBlock::Branch(jump_instr));
    }

    /// Begins an else conditional.
    pub fn start_else(&mut self) {
        let jump_instr = self.add(Instr::Jump(!0));
        self.end_condition(jump_instr + 1);
        self.pending_block.push(PendingBlock::Branch(jump_instr));
    }

    /// Closes the current if block.
    pub fn end_if(&mut self) {
        self.end_condition(self.next_instruction());
    }

    /// Starts a short circuited bool block.
    pub fn start_sc_bool(&mut self) {
        self.pending_block.push(PendingBlock::ScBool(Vec::new()));
    }

    /// Emits a short circuited bool operator.
    pub fn sc_bool(&mut self, and: bool) {
        let instr = self.add(if and {
            Instr::JumpIfFalseOrPop(!0)
        } else {
            Instr::JumpIfTrueOrPop(!0)
        });
        if let Some(PendingBlock::ScBool(ref mut instructions)) = self.pending_block.last_mut() {
            instructions.push(instr);
        } else {
            unreachable!("tried to emit sc_bool from outside of sc_bool block");
        }
    }

    /// Ends a short circuited bool block.
    pub fn end_sc_bool(&mut self) {
        let end = self.next_instruction();
        if let Some(PendingBlock::ScBool(instructions)) = self.pending_block.pop() {
            for instr in instructions {
                match self.code.get_mut(instr) {
                    Some(Instr::JumpIfFalseOrPop(ref mut target))
                    | Some(Instr::JumpIfTrueOrPop(ref mut target)) => {
                        *target = end as u32;
                    }
                    _ => unreachable!("tried to patch invalid instruction"),
                }
            }
        }
    }

    fn end_condition(&mut self, jump_instr: usize) {
        match self.pending_block.pop() {
            Some(PendingBlock::Branch(instr)) => match self.code.get_mut(instr) {
                Some(Instr::JumpIfFalse(ref mut target)) | Some(Instr::Jump(ref mut target)) => {
                    *target = jump_instr as u32;
                }
                _ => {}
            },
            _ => unreachable!("not inside a branch"),
        }
    }

    /// Compiles a statement.
    pub fn compile_stmt(&mut self, stmt: &ast::Stmt) -> Result<(), Error> {
        match stmt {
            ast::Stmt::Template(t) => {
                self.set_line_from_span(t.span());
                for node in &t.children {
                    ok!(self.compile_stmt(node));
                }
            }
            ast::Stmt::EmitExpr(expr) => {
                ok!(self.compile_emit_expr(expr));
            }
            ast::Stmt::EmitRaw(raw) => {
                self.set_line_from_span(raw.span());
                let idx = self.code.add_string(&raw.raw);
                self.add(Instr::EmitText(idx));
            }
            ast::Stmt::ForLoop(for_loop) => {
                ok!(self.compile_for_loop(for_loop));
            }
            ast::Stmt::IfCond(if_cond) => {
                ok!(self.compile_if_stmt(if_cond));
            }
            ast::Stmt::WithBlock(with_block) => {
                self.set_line_from_span(with_block.span());
                self.add(Instr::PushWith);
                self.open_frame();
                for (target, expr) in &with_block.assignments {
                    ok!(self.compile_expr(expr));
                    ok!(self.compile_assignment(target));
                }
                for node in &with_block.body {
                    ok!(self.compile_stmt(node));
                }
                self.add(Instr::PopFrame);
                self.close_frame();
            }
            ast::Stmt::Set(set) => {
                self.set_line_from_span(set.span());
                ok!(self.compile_expr(&set.expr));
                ok!(self.compile_assignment(&set.target));
            }
            ast::Stmt::SetBlock(set_block) => {
                self.set_line_from_span(set_block.span());
                self.add(Instr::BeginCapture(CaptureMode::Capture));
                for node in &set_block.body {
                    ok!(self.compile_stmt(node));
                }
                self.add(Instr::EndCapture);
                if let Some(ref filter) = set_block.filter {
                    ok!(self.compile_expr(filter));
                }
                ok!(self.compile_assignment(&set_block.target));
            }
            ast::Stmt::Block(block) => {
                ok!(self.compile_block(block));
            }
            ast::Stmt::Extends(extends) => {
                self.set_line_from_span(extends.span());
                ok!(self.compile_expr(&extends.name));
                self.add(Instr::LoadBlocks);
            }
            ast::Stmt::Include(include) => {
                self.set_line_from_span(include.span());
                ok!(self.compile_expr(&include.name));
                self.add(Instr::Include {
                    ignore_missing: include.ignore_missing,
                    with_context: include.with_context,
                });
            }
            ast::Stmt::Import(import) => {
                self.set_line_from_span(import.span());
                ok!(self.compile_expr(&import.expr));
                self.add(Instr::ImportModule);
                ok!(self.compile_assignment(&import.name));
            }
            ast::Stmt::FromImport(from_import) => {
                self.set_line_from_span(from_import.span());
                ok!(self.compile_expr(&from_import.expr));
                self.add(Instr::ImportModule);
                for (name, alias) in &from_import.names {
                    self.add(Instr::DupTop);
                    if let ast::Expr::Var(var) = name {
                        let idx = self.code.add_name(&var.id);
                        self.add(Instr::GetAttr(idx));
                    }
                    ok!(self.compile_assignment(alias.as_ref().unwrap_or(name)));
                }
                self.add(Instr::DiscardTop);
            }
            ast::Stmt::AutoEscape(auto_escape) => {
                self.set_line_from_span(auto_escape.span());
                ok!(self.compile_expr(&auto_escape.enabled));
                self.add(Instr::PushAutoEscape);
                for node in &auto_escape.body {
                    ok!(self.compile_stmt(node));
                }
                self.add(Instr::PopAutoEscape);
            }
            ast::Stmt::FilterBlock(filter_block) => {
                self.set_line_from_span(filter_block.span());
                self.add(Instr::BeginCapture(CaptureMode::Capture));
                for node in &filter_block.body {
                    ok!(self.compile_stmt(node));
                }
                self.add(Instr::EndCapture);
                ok!(self.compile_expr(&filter_block.filter));
                self.add(Instr::Output(1));
            }
            ast::Stmt::Macro(macro_decl) => {
                self.set_line_from_span(macro_decl.span());
                let name_idx = ok!(self.compile_macro_decl(macro_decl));
                self.add(Instr::StoreVar(name_idx));
            }
            ast::Stmt::CallBlock(call_block) => {
                self.set_line_from_span(call_block.span());
                self.add(Instr::PushWith);
                self.open_frame();
                let caller_idx = ok!(self.compile_macro_decl(&call_block.macro_decl));
                self.add(Instr::StoreVar(caller_idx));
                ok!(self.compile_call(&call_block.call, true));
                self.add(Instr::Output(1));
                self.add(Instr::PopFrame);
                self.close_frame();
            }
            ast::Stmt::Do(do_stmt) => {
                self.set_line_from_span(do_stmt.span());
                ok!(self.compile_call(&do_stmt.call, false));
                self.add(Instr::DiscardTop);
            }
            ast::Stmt::Break(b) => {
                self.set_line_from_span(b.span());
                let pops = self.loop_frame_depth.last().copied().unwrap_or(0);
                for _ in 0..pops {
                    self.add(Instr::PopFrame);
                }
                let jump = self.add(Instr::Jump(!0));
                if let Some(PendingBlock::Loop {
                    ref mut break_jumps,
                    ..
                }) = self
                    .pending_block
                    .iter_mut()
                    .rev()
                    .find(|block| matches!(block, PendingBlock::Loop { .. }))
                {
                    break_jumps.push(jump);
                }
            }
            ast::Stmt::Continue(c) => {
                self.set_line_from_span(c.span());
                let pops = self.loop_frame_depth.last().copied().unwrap_or(0);
                for _ in 0..pops {
                    self.add(Instr::PopFrame);
                }
                if let Some(PendingBlock::Loop { iter_instr, .. }) = self
                    .pending_block
                    .iter()
                    .rev()
                    .find(|block| matches!(block, PendingBlock::Loop { .. }))
                {
                    let target = *iter_instr as u32;
                    self.add(Instr::Jump(target));
                }
            }
            ast::Stmt::Debug(d) => {
                self.set_line_from_span(d.span());
                self.add(Instr::EmitDebug);
            }
        }
        Ok(())
    }

    /// Compiles a macro declaration leaving the macro value on the stack.
    ///
    /// Returns the name pool index of the macro name.
    fn compile_macro_decl(&mut self, macro_decl: &ast::Macro) -> Result<u32, Error> {
        let jump_over = self.add(Instr::Jump(!0));
        let offset = self.next_instruction();
        for node in &macro_decl.body {
            ok!(self.compile_stmt(node));
        }
        self.add(Instr::Return);
        let after = self.next_instruction();
        if let Some(Instr::Jump(ref mut target)) = self.code.get_mut(jump_over) {
            *target = after as u32;
        }

        let arg_names = macro_decl
            .args
            .iter()
            .map(|arg| match arg {
                ast::Expr::Var(var) => Value::from(var.id.clone()),
                _ => Value::UNDEFINED,
            })
            .collect::<Vec<_>>();
        let const_idx = self.code.add_const(Value::from(arg_names));
        self.add(Instr::LoadConst(const_idx));
        for default in &macro_decl.defaults {
            ok!(self.compile_expr(default));
        }
        let default_count = macro_decl.defaults.len() as u16;
        self.add(Instr::BuildList(default_count));
        let name_idx = self.code.add_name(&macro_decl.name);
        let flags = if references_caller(&macro_decl.body) {
            MACRO_CALLER
        } else {
            0
        };
        self.add(Instr::BuildMacro(name_idx, offset as u32, flags));
        Ok(name_idx)
    }

    fn compile_block(&mut self, block: &ast::Spanned<ast::Block>) -> Result<(), Error> {
        self.set_line_from_span(block.span());
        let mut sub = self.new_subgenerator();
        for node in &block.body {
            ok!(sub.compile_stmt(node));
        }
        let code = self.finish_subgenerator(sub);
        self.blocks.insert(Arc::from(&block.name as &str), code);
        let name_idx = self.code.add_name(&block.name);
        self.add(Instr::CallBlock(name_idx));
        Ok(())
    }

    fn compile_if_stmt(&mut self, if_cond: &ast::Spanned<ast::IfCond>) -> Result<(), Error> {
        self.set_line_from_span(if_cond.span());
        ok!(self.compile_expr(&if_cond.expr));
        self.start_if();
        for node in &if_cond.true_body {
            ok!(self.compile_stmt(node));
        }
        if !if_cond.false_body.is_empty() {
            self.start_else();
            for node in &if_cond.false_body {
                ok!(self.compile_stmt(node));
            }
        }
        self.end_if();
        Ok(())
    }

    fn compile_emit_expr(&mut self, expr: &ast::Spanned<ast::EmitExpr>) -> Result<(), Error> {
        self.set_line_from_span(expr.span());
        if let ast::Expr::Call(call) = &expr.expr {
            if let ast::Expr::Var(var) = &call.expr {
                if var.id == "super" && call.args.is_empty() {
                    self.add(Instr::FastSuper);
                    return Ok(());
                }
                if var.id == "loop" && call.args.len() == 1 {
                    if let ast::CallArg::Pos(ref arg) = call.args[0] {
                        ok!(self.compile_expr(arg));
                        self.add(Instr::FastRecurse);
                        return Ok(());
                    }
                }
            }
        }
        ok!(self.compile_expr(&expr.expr));
        self.add(Instr::Output(1));
        Ok(())
    }

    fn compile_for_loop(&mut self, for_loop: &ast::Spanned<ast::ForLoop>) -> Result<(), Error> {
        self.set_line_from_span(for_loop.span());
        if let Some(ref filter_expr) = for_loop.filter_expr {
            // filter expressions work like a nested for loop without the
            // special loop variable that appends into a new list just
            // outside of the loop.
            self.add(Instr::BuildList(0));
            ok!(self.compile_expr(&for_loop.iter));
            self.start_for_loop(false, false);
            self.add(Instr::DupTop);
            ok!(self.compile_assignment(&for_loop.target));
            ok!(self.compile_expr(filter_expr));
            self.start_if();
            self.add(Instr::ListAppend);
            self.start_else();
            self.add(Instr::DiscardTop);
            self.end_if();
            self.end_for_loop(false);
        } else {
            ok!(self.compile_expr(&for_loop.iter));
        }
        self.start_for_loop(true, for_loop.recursive);
        ok!(self.compile_assignment(&for_loop.target));
        for node in &for_loop.body {
            ok!(self.compile_stmt(node));
        }
        self.end_for_loop(!for_loop.else_body.is_empty());
        if !for_loop.else_body.is_empty() {
            self.start_if();
            for node in &for_loop.else_body {
                ok!(self.compile_stmt(node));
            }
            self.end_if();
        }
        Ok(())
    }

    /// Compiles an assignment expression.
    pub fn compile_assignment(&mut self, expr: &ast::Expr) -> Result<(), Error> {
        match expr {
            ast::Expr::Var(var) => {
                let idx = self.code.add_name(&var.id);
                self.add(Instr::StoreVar(idx));
            }
            ast::Expr::GetAttr(attr) => {
                ok!(self.compile_expr(&attr.expr));
                let idx = self.code.add_name(&attr.name);
                self.add(Instr::SetAttr(idx));
            }
            ast::Expr::List(list) => {
                self.set_line_from_span(list.span());
                self.add(Instr::UnpackList(list.items.len() as u16));
                for expr in &list.items {
                    ok!(self.compile_assignment(expr));
                }
            }
            _ => unreachable!("bad assignment target"),
        }
        Ok(())
    }

    /// Compiles call arguments and returns the argument count.
    fn compile_call_args(
        &mut self,
        args: &[ast::CallArg],
        with_caller: bool,
    ) -> Result<u16, Error> {
        let mut pos_count = 0u16;
        let mut kwarg_count = 0u16;
        for arg in args {
            if let ast::CallArg::Pos(expr) = arg {
                ok!(self.compile_expr(expr));
                pos_count += 1;
            }
        }
        for arg in args {
            if let ast::CallArg::Kwarg(name, expr) = arg {
                let idx = self.code.add_const(Value::from(name.clone()));
                self.add(Instr::LoadConst(idx));
                ok!(self.compile_expr(expr));
                kwarg_count += 1;
            }
        }
        if with_caller {
            let idx = self.code.add_const(Value::from("caller"));
            self.add(Instr::LoadConst(idx));
            let name_idx = self.code.add_name("caller");
            self.add(Instr::Lookup(name_idx));
            kwarg_count += 1;
        }
        if kwarg_count > 0 {
            self.add(Instr::BuildKwargs(kwarg_count));
            Ok(pos_count + 1)
        } else {
            Ok(pos_count)
        }
    }

    fn compile_call(&mut self, c: &ast::Spanned<ast::Call>, with_caller: bool) -> Result<(), Error> {
        self.set_line_from_span(c.span());
        match c.identify_call() {
            ast::CallType::Function(name) => {
                let name_idx = self.code.add_name(name);
                let arg_count = ok!(self.compile_call_args(&c.args, with_caller));
                self.add(Instr::CallFunction(name_idx, arg_count));
            }
            ast::CallType::Method(expr, name) => {
                ok!(self.compile_expr(expr));
                let name_idx = self.code.add_name(name);
                let arg_count = ok!(self.compile_call_args(&c.args, with_caller));
                self.add(Instr::CallMethod(name_idx, arg_count + 1));
            }
            ast::CallType::Object(expr) => {
                ok!(self.compile_expr(expr));
                let arg_count = ok!(self.compile_call_args(&c.args, with_caller));
                self.add(Instr::CallObject(arg_count + 1));
            }
        }
        Ok(())
    }

    /// Compiles an expression.
    pub fn compile_expr(&mut self, expr: &ast::Expr) -> Result<(), Error> {
        match expr {
            ast::Expr::Var(v) => {
                self.set_line_from_span(v.span());
                let idx = self.code.add_name(&v.id);
                self.add(Instr::Lookup(idx));
            }
            ast::Expr::Const(v) => {
                self.set_line_from_span(v.span());
                let idx = self.code.add_const(v.value.clone());
                self.add(Instr::LoadConst(idx));
            }
            ast::Expr::Slice(s) => {
                self.set_line_from_span(s.span());
                ok!(self.compile_expr(&s.expr));
                let none_idx = self.code.add_const(Value::from(()));
                match s.start {
                    Some(ref start) => ok!(self.compile_expr(start)),
                    None => {
                        self.add(Instr::LoadConst(none_idx));
                    }
                }
                match s.stop {
                    Some(ref stop) => ok!(self.compile_expr(stop)),
                    None => {
                        self.add(Instr::LoadConst(none_idx));
                    }
                }
                match s.step {
                    Some(ref step) => ok!(self.compile_expr(step)),
                    None => {
                        self.add(Instr::LoadConst(none_idx));
                    }
                }
                self.add(Instr::Slice);
            }
            ast::Expr::UnaryOp(c) => {
                self.set_line_from_span(c.span());
                ok!(self.compile_expr(&c.expr));
                match c.op {
                    ast::UnaryOpKind::Not => self.add(Instr::Not),
                    ast::UnaryOpKind::Neg => self.add(Instr::Neg),
                };
            }
            ast::Expr::BinOp(c) => {
                ok!(self.compile_bin_op(c));
            }
            ast::Expr::Compare(c) => {
                ok!(self.compile_compare(c));
            }
            ast::Expr::IfExpr(i) => {
                self.set_line_from_span(i.span());
                ok!(self.compile_expr(&i.test_expr));
                self.start_if();
                ok!(self.compile_expr(&i.true_expr));
                self.start_else();
                match i.false_expr {
                    Some(ref false_expr) => ok!(self.compile_expr(false_expr)),
                    None => {
                        let idx = self.code.add_const(Value::UNDEFINED);
                        self.add(Instr::LoadConst(idx));
                    }
                }
                self.end_if();
            }
            ast::Expr::Filter(f) => {
                self.set_line_from_span(f.span());
                if let Some(ref expr) = f.expr {
                    ok!(self.compile_expr(expr));
                }
                let arg_count = ok!(self.compile_call_args(&f.args, false));
                let name_idx = self.code.add_name(&f.name);
                self.add(Instr::ApplyFilter(name_idx, arg_count + 1));
            }
            ast::Expr::Test(f) => {
                self.set_line_from_span(f.span());
                ok!(self.compile_expr(&f.expr));
                let arg_count = ok!(self.compile_call_args(&f.args, false));
                let name_idx = self.code.add_name(&f.name);
                self.add(Instr::PerformTest(name_idx, arg_count + 1));
            }
            ast::Expr::GetAttr(g) => {
                self.set_line_from_span(g.span());
                ok!(self.compile_expr(&g.expr));
                let idx = self.code.add_name(&g.name);
                self.add(Instr::GetAttr(idx));
            }
            ast::Expr::GetItem(g) => {
                self.set_line_from_span(g.span());
                ok!(self.compile_expr(&g.expr));
                ok!(self.compile_expr(&g.subscript_expr));
                self.add(Instr::GetItem);
            }
            ast::Expr::Call(c) => {
                ok!(self.compile_call(c, false));
            }
            ast::Expr::List(l) => {
                if let Some(val) = l.as_const() {
                    let idx = self.code.add_const(val);
                    self.add(Instr::LoadConst(idx));
                } else {
                    self.set_line_from_span(l.span());
                    for item in &l.items {
                        ok!(self.compile_expr(item));
                    }
                    self.add(Instr::BuildList(l.items.len() as u16));
                }
            }
            ast::Expr::Map(m) => {
                if let Some(val) = m.as_const() {
                    let idx = self.code.add_const(val);
                    self.add(Instr::LoadConst(idx));
                } else {
                    self.set_line_from_span(m.span());
                    debug_assert_eq!(m.keys.len(), m.values.len());
                    for (key, value) in m.keys.iter().zip(m.values.iter()) {
                        ok!(self.compile_expr(key));
                        ok!(self.compile_expr(value));
                    }
                    self.add(Instr::BuildMap(m.keys.len() as u16));
                }
            }
        }
        Ok(())
    }

    fn compile_compare(&mut self, c: &ast::Spanned<ast::Compare>) -> Result<(), Error> {
        self.set_line_from_span(c.span());
        ok!(self.compile_expr(&c.expr));
        if c.ops.len() == 1 {
            let (op, ref operand) = c.ops[0];
            ok!(self.compile_expr(operand));
            self.add(Instr::Cmp(op));
            return Ok(());
        }

        // chained comparisons evaluate every operand exactly once:
        // `a < b < c` is `(a < b) and (b < c)` where `b` is kept on the
        // stack between the individual comparisons.
        let mut fail_jumps = Vec::new();
        let last = c.ops.len() - 1;
        for (idx, (op, operand)) in c.ops.iter().enumerate() {
            ok!(self.compile_expr(operand));
            if idx < last {
                self.add(Instr::DupTop);
                self.add(Instr::Rot3);
            }
            self.add(Instr::Cmp(*op));
            if idx < last {
                fail_jumps.push(self.add(Instr::JumpIfFalseOrPop(!0)));
            }
        }
        let done_jump = self.add(Instr::Jump(!0));
        let fail = self.next_instruction();
        for fail_jump in fail_jumps {
            if let Some(Instr::JumpIfFalseOrPop(ref mut target)) = self.code.get_mut(fail_jump) {
                *target = fail as u32;
            }
        }
        // on failure the unused middle operand is still on the stack
        self.add(Instr::Swap);
        self.add(Instr::DiscardTop);
        let done = self.next_instruction();
        if let Some(Instr::Jump(ref mut target)) = self.code.get_mut(done_jump) {
            *target = done as u32;
        }
        Ok(())
    }

    fn compile_bin_op(&mut self, c: &ast::Spanned<ast::BinOp>) -> Result<(), Error> {
        self.set_line_from_span(c.span());
        let instr = match c.op {
            ast::BinOpKind::ScAnd | ast::BinOpKind::ScOr => {
                self.start_sc_bool();
                ok!(self.compile_expr(&c.left));
                self.sc_bool(matches!(c.op, ast::BinOpKind::ScAnd));
                ok!(self.compile_expr(&c.right));
                self.end_sc_bool();
                return Ok(());
            }
            ast::BinOpKind::Add => Instr::Add,
            ast::BinOpKind::Sub => Instr::Sub,
            ast::BinOpKind::Mul => Instr::Mul,
            ast::BinOpKind::Div => Instr::Div,
            ast::BinOpKind::FloorDiv => Instr::IntDiv,
            ast::BinOpKind::Rem => Instr::Rem,
            ast::BinOpKind::Pow => Instr::Pow,
            ast::BinOpKind::Concat => Instr::StringConcat,
        };
        ok!(self.compile_expr(&c.left));
        ok!(self.compile_expr(&c.right));
        self.add(instr);
        Ok(())
    }

    /// Converts the compiler into the bytecode and block table.
    pub fn finish(self) -> (Bytecode, BTreeMap<Arc<str>, Bytecode>) {
        debug_assert!(self.pending_block.is_empty());
        (self.code, self.blocks)
    }
}

/// Checks if a macro body references the `caller` variable.
fn references_caller(stmts: &[ast::Stmt]) -> bool {
    fn scan_call_args(args: &[ast::CallArg]) -> bool {
        args.iter().any(|arg| match arg {
            ast::CallArg::Pos(expr) | ast::CallArg::Kwarg(_, expr) => scan_expr(expr),
        })
    }

    fn scan_expr(expr: &ast::Expr) -> bool {
        match expr {
            ast::Expr::Var(var) => var.id == "caller",
            ast::Expr::Const(_) => false,
            ast::Expr::Slice(slice) => {
                scan_expr(&slice.expr)
                    || slice.start.as_ref().map_or(false, |x| scan_expr(x))
                    || slice.stop.as_ref().map_or(false, |x| scan_expr(x))
                    || slice.step.as_ref().map_or(false, |x| scan_expr(x))
            }
            ast::Expr::UnaryOp(op) => scan_expr(&op.expr),
            ast::Expr::BinOp(op) => scan_expr(&op.left) || scan_expr(&op.right),
            ast::Expr::Compare(cmp) => {
                scan_expr(&cmp.expr) || cmp.ops.iter().any(|(_, expr)| scan_expr(expr))
            }
            ast::Expr::IfExpr(ifexpr) => {
                scan_expr(&ifexpr.test_expr)
                    || scan_expr(&ifexpr.true_expr)
                    || ifexpr.false_expr.as_ref().map_or(false, |x| scan_expr(x))
            }
            ast::Expr::Filter(filter) => {
                filter.expr.as_ref().map_or(false, |x| scan_expr(x))
                    || scan_call_args(&filter.args)
            }
            ast::Expr::Test(test) => scan_expr(&test.expr) || scan_call_args(&test.args),
            ast::Expr::GetAttr(attr) => scan_expr(&attr.expr),
            ast::Expr::GetItem(item) => {
                scan_expr(&item.expr) || scan_expr(&item.subscript_expr)
            }
            ast::Expr::Call(call) => scan_expr(&call.expr) || scan_call_args(&call.args),
            ast::Expr::List(list) => list.items.iter().any(scan_expr),
            ast::Expr::Map(map) => {
                map.keys.iter().any(scan_expr) || map.values.iter().any(scan_expr)
            }
        }
    }

    fn scan_stmt(stmt: &ast::Stmt) -> bool {
        match stmt {
            ast::Stmt::Template(t) => t.children.iter().any(scan_stmt),
            ast::Stmt::EmitExpr(expr) => scan_expr(&expr.expr),
            ast::Stmt::EmitRaw(_) => false,
            ast::Stmt::ForLoop(for_loop) => {
                scan_expr(&for_loop.iter)
                    || for_loop.filter_expr.as_ref().map_or(false, |x| scan_expr(x))
                    || for_loop.body.iter().any(scan_stmt)
                    || for_loop.else_body.iter().any(scan_stmt)
            }
            ast::Stmt::IfCond(if_cond) => {
                scan_expr(&if_cond.expr)
                    || if_cond.true_body.iter().any(scan_stmt)
                    || if_cond.false_body.iter().any(scan_stmt)
            }
            ast::Stmt::WithBlock(with_block) => {
                with_block.assignments.iter().any(|(_, expr)| scan_expr(expr))
                    || with_block.body.iter().any(scan_stmt)
            }
            ast::Stmt::Set(set) => scan_expr(&set.expr),
            ast::Stmt::SetBlock(set_block) => set_block.body.iter().any(scan_stmt),
            ast::Stmt::AutoEscape(auto_escape) => auto_escape.body.iter().any(scan_stmt),
            ast::Stmt::FilterBlock(filter_block) => filter_block.body.iter().any(scan_stmt),
            ast::Stmt::Block(block) => block.body.iter().any(scan_stmt),
            ast::Stmt::Extends(extends) => scan_expr(&extends.name),
            ast::Stmt::Include(include) => scan_expr(&include.name),
            ast::Stmt::Import(import) => scan_expr(&import.expr),
            ast::Stmt::FromImport(from_import) => scan_expr(&from_import.expr),
            ast::Stmt::Macro(macro_decl) => macro_decl.body.iter().any(scan_stmt),
            ast::Stmt::CallBlock(call_block) => {
                scan_expr(&call_block.call.expr) || scan_call_args(&call_block.call.args)
            }
            ast::Stmt::Do(do_stmt) => {
                scan_expr(&do_stmt.call.expr) || scan_call_args(&do_stmt.call.args)
            }
            ast::Stmt::Break(_) | ast::Stmt::Continue(_) | ast::Stmt::Debug(_) => false,
        }
    }

    stmts.iter().any(scan_stmt)
}
