//! The AST optimizer.
//!
//! Every parsed template runs through this pass before compilation.  It
//! folds constant expressions, eliminates dead branches and merges
//! adjacent raw output.  Folding delegates to the same operations the VM
//! uses at runtime so the two cannot drift apart.  Anything that would
//! error (division by zero, overflow) is left in place so that the error
//! surfaces with full render context.
//!
//! The pass is idempotent: optimizing an already optimized tree is a
//! no-op.

use crate::compiler::ast::{self, Spanned};
use crate::value::{Value, ValueKind};
use crate::vm::State;

/// Optimizes a parsed template.
pub fn optimize(state: &State, stmt: ast::Stmt) -> ast::Stmt {
    match stmt {
        ast::Stmt::Template(t) => {
            let (t, span) = t.into_parts();
            ast::Stmt::Template(Spanned::new(
                ast::Template {
                    children: optimize_body(state, t.children),
                },
                span,
            ))
        }
        other => other,
    }
}

fn optimize_body(state: &State, body: Vec<ast::Stmt>) -> Vec<ast::Stmt> {
    let mut rv: Vec<ast::Stmt> = Vec::with_capacity(body.len());
    for stmt in body {
        for stmt in optimize_stmt(state, stmt) {
            // merge adjacent raw output
            if let ast::Stmt::EmitRaw(ref new_raw) = stmt {
                if let Some(ast::Stmt::EmitRaw(last_raw)) = rv.last_mut() {
                    last_raw.raw.push_str(&new_raw.raw);
                    continue;
                }
            }
            rv.push(stmt);
        }
    }
    rv
}

fn optimize_stmt(state: &State, stmt: ast::Stmt) -> Vec<ast::Stmt> {
    match stmt {
        ast::Stmt::EmitExpr(expr) => {
            let (node, span) = expr.into_parts();
            let folded = fold_expr(state, node.expr);
            // constant output of plain strings becomes raw data only when
            // no escaping can apply (markup values).
            vec![ast::Stmt::EmitExpr(Spanned::new(
                ast::EmitExpr { expr: folded },
                span,
            ))]
        }
        ast::Stmt::IfCond(if_cond) => {
            let (node, span) = if_cond.into_parts();
            let expr = fold_expr(state, node.expr);
            let true_body = optimize_body(state, node.true_body);
            let false_body = optimize_body(state, node.false_body);
            if let Some(value) = expr.as_const() {
                return if value.is_true() { true_body } else { false_body };
            }
            vec![ast::Stmt::IfCond(Spanned::new(
                ast::IfCond {
                    expr,
                    true_body,
                    false_body,
                },
                span,
            ))]
        }
        ast::Stmt::ForLoop(for_loop) => {
            let (node, span) = for_loop.into_parts();
            let iter = fold_expr(state, node.iter);
            let filter_expr = node.filter_expr.map(|expr| fold_expr(state, expr));
            let body = optimize_body(state, node.body);
            let else_body = optimize_body(state, node.else_body);
            if let Some(value) = iter.as_const() {
                let is_empty_literal = match value.kind() {
                    ValueKind::List | ValueKind::Dict | ValueKind::String => {
                        value.len() == Some(0)
                    }
                    _ => false,
                };
                if is_empty_literal {
                    return else_body;
                }
            }
            vec![ast::Stmt::ForLoop(Spanned::new(
                ast::ForLoop {
                    target: node.target,
                    iter,
                    filter_expr,
                    recursive: node.recursive,
                    body,
                    else_body,
                },
                span,
            ))]
        }
        ast::Stmt::WithBlock(with_block) => {
            let (node, span) = with_block.into_parts();
            vec![ast::Stmt::WithBlock(Spanned::new(
                ast::WithBlock {
                    assignments: node
                        .assignments
                        .into_iter()
                        .map(|(target, expr)| (target, fold_expr(state, expr)))
                        .collect(),
                    body: optimize_body(state, node.body),
                },
                span,
            ))]
        }
        ast::Stmt::Set(set) => {
            let (node, span) = set.into_parts();
            vec![ast::Stmt::Set(Spanned::new(
                ast::Set {
                    target: node.target,
                    expr: fold_expr(state, node.expr),
                },
                span,
            ))]
        }
        ast::Stmt::SetBlock(set_block) => {
            let (node, span) = set_block.into_parts();
            vec![ast::Stmt::SetBlock(Spanned::new(
                ast::SetBlock {
                    target: node.target,
                    filter: node.filter,
                    body: optimize_body(state, node.body),
                },
                span,
            ))]
        }
        ast::Stmt::Block(block) => {
            let (node, span) = block.into_parts();
            vec![ast::Stmt::Block(Spanned::new(
                ast::Block {
                    name: node.name,
                    body: optimize_body(state, node.body),
                },
                span,
            ))]
        }
        ast::Stmt::AutoEscape(auto_escape) => {
            let (node, span) = auto_escape.into_parts();
            vec![ast::Stmt::AutoEscape(Spanned::new(
                ast::AutoEscape {
                    enabled: fold_expr(state, node.enabled),
                    body: optimize_body(state, node.body),
                },
                span,
            ))]
        }
        ast::Stmt::FilterBlock(filter_block) => {
            let (node, span) = filter_block.into_parts();
            vec![ast::Stmt::FilterBlock(Spanned::new(
                ast::FilterBlock {
                    filter: node.filter,
                    body: optimize_body(state, node.body),
                },
                span,
            ))]
        }
        ast::Stmt::Macro(macro_decl) => {
            let (node, span) = macro_decl.into_parts();
            vec![ast::Stmt::Macro(Spanned::new(
                ast::Macro {
                    name: node.name,
                    args: node.args,
                    defaults: node
                        .defaults
                        .into_iter()
                        .map(|expr| fold_expr(state, expr))
                        .collect(),
                    body: optimize_body(state, node.body),
                },
                span,
            ))]
        }
        other => vec![other],
    }
}

fn const_value(expr: &ast::Expr) -> Option<Value> {
    expr.as_const().cloned()
}

fn make_const(value: Value, span: crate::compiler::tokens::Span) -> ast::Expr {
    ast::Expr::Const(Spanned::new(ast::Const { value }, span))
}

fn fold_expr(state: &State, expr: ast::Expr) -> ast::Expr {
    use crate::value::ops;

    match expr {
        ast::Expr::UnaryOp(op) => {
            let (node, span) = op.into_parts();
            let inner = fold_expr(state, node.expr);
            if let Some(value) = const_value(&inner) {
                match node.op {
                    ast::UnaryOpKind::Not => {
                        return make_const(Value::from(!value.is_true()), span)
                    }
                    ast::UnaryOpKind::Neg => {
                        if let Ok(folded) = ops::neg(&value) {
                            return make_const(folded, span);
                        }
                    }
                }
            }
            ast::Expr::UnaryOp(Spanned::new(
                ast::UnaryOp {
                    op: node.op,
                    expr: inner,
                },
                span,
            ))
        }
        ast::Expr::BinOp(op) => {
            let (node, span) = op.into_parts();
            let left = fold_expr(state, node.left);
            let right = fold_expr(state, node.right);
            if let (Some(lhs), Some(rhs)) = (const_value(&left), const_value(&right)) {
                let folded = match node.op {
                    ast::BinOpKind::ScAnd => Some(if lhs.is_true() { rhs } else { lhs }),
                    ast::BinOpKind::ScOr => Some(if lhs.is_true() { lhs } else { rhs }),
                    ast::BinOpKind::Add => ops::add(&lhs, &rhs).ok(),
                    ast::BinOpKind::Sub => ops::sub(&lhs, &rhs).ok(),
                    ast::BinOpKind::Mul => ops::mul(&lhs, &rhs).ok(),
                    // division by zero stays for runtime so the error
                    // surfaces with render context
                    ast::BinOpKind::Div if rhs.is_true() => ops::div(&lhs, &rhs).ok(),
                    ast::BinOpKind::FloorDiv if rhs.is_true() => ops::int_div(&lhs, &rhs).ok(),
                    ast::BinOpKind::Rem if rhs.is_true() => ops::rem(&lhs, &rhs).ok(),
                    ast::BinOpKind::Pow => ops::pow(&lhs, &rhs).ok(),
                    ast::BinOpKind::Concat => Some(ops::string_concat(&lhs, &rhs)),
                    _ => None,
                };
                if let Some(folded) = folded {
                    return make_const(folded, span);
                }
            }
            ast::Expr::BinOp(Spanned::new(
                ast::BinOp {
                    op: node.op,
                    left,
                    right,
                },
                span,
            ))
        }
        ast::Expr::Compare(cmp) => {
            let (node, span) = cmp.into_parts();
            let first = fold_expr(state, node.expr);
            let ops_folded: Vec<(ast::CmpOp, ast::Expr)> = node
                .ops
                .into_iter()
                .map(|(op, expr)| (op, fold_expr(state, expr)))
                .collect();
            let all_const = const_value(&first).is_some()
                && ops_folded.iter().all(|(_, expr)| expr.as_const().is_some());
            if all_const {
                let mut lhs = const_value(&first).unwrap();
                let mut result = true;
                let mut failed = false;
                for (op, expr) in &ops_folded {
                    let rhs = const_value(expr).unwrap();
                    let outcome = match op {
                        ast::CmpOp::Eq => Ok(lhs == rhs),
                        ast::CmpOp::Ne => Ok(lhs != rhs),
                        ast::CmpOp::Lt => Ok(lhs < rhs),
                        ast::CmpOp::Lte => Ok(lhs <= rhs),
                        ast::CmpOp::Gt => Ok(lhs > rhs),
                        ast::CmpOp::Gte => Ok(lhs >= rhs),
                        ast::CmpOp::In => ops::contains(&rhs, &lhs).map(|v| v.is_true()),
                        ast::CmpOp::NotIn => ops::contains(&rhs, &lhs).map(|v| !v.is_true()),
                    };
                    match outcome {
                        Ok(true) => lhs = rhs,
                        Ok(false) => {
                            result = false;
                            break;
                        }
                        Err(_) => {
                            failed = true;
                            break;
                        }
                    }
                }
                if !failed {
                    return make_const(Value::from(result), span);
                }
            }
            ast::Expr::Compare(Spanned::new(
                ast::Compare {
                    expr: first,
                    ops: ops_folded,
                },
                span,
            ))
        }
        ast::Expr::IfExpr(ifexpr) => {
            let (node, span) = ifexpr.into_parts();
            let test_expr = fold_expr(state, node.test_expr);
            let true_expr = fold_expr(state, node.true_expr);
            let false_expr = node.false_expr.map(|expr| fold_expr(state, expr));
            if let Some(test) = const_value(&test_expr) {
                return if test.is_true() {
                    true_expr
                } else {
                    false_expr.unwrap_or_else(|| make_const(Value::UNDEFINED, span))
                };
            }
            ast::Expr::IfExpr(Spanned::new(
                ast::IfExpr {
                    test_expr,
                    true_expr,
                    false_expr,
                },
                span,
            ))
        }
        ast::Expr::Filter(filter) => {
            let (node, span) = filter.into_parts();
            let inner = node.expr.map(|expr| fold_expr(state, expr));
            let args: Vec<ast::CallArg> = node
                .args
                .into_iter()
                .map(|arg| match arg {
                    ast::CallArg::Pos(expr) => ast::CallArg::Pos(fold_expr(state, expr)),
                    ast::CallArg::Kwarg(name, expr) => {
                        ast::CallArg::Kwarg(name, fold_expr(state, expr))
                    }
                })
                .collect();

            // pure builtin filters over constant operands are evaluated at
            // compile time through the real registry; anything that errors
            // is deferred to runtime.
            let const_args: Option<Vec<Value>> = {
                let piped = inner.as_ref().and_then(const_value);
                match piped {
                    Some(piped) if args.iter().all(|arg| {
                        matches!(arg, ast::CallArg::Pos(expr) if expr.as_const().is_some())
                    }) =>
                    {
                        let mut rv = vec![piped];
                        for arg in &args {
                            if let ast::CallArg::Pos(expr) = arg {
                                rv.push(const_value(expr).unwrap());
                            }
                        }
                        Some(rv)
                    }
                    _ => None,
                }
            };
            if let Some(const_args) = const_args {
                // the static builtin name check is the cheap prefilter; the
                // purity flag on the resolved callable is authoritative so
                // user overrides of builtin names never fold.
                if crate::defaults::is_builtin_filter(&node.name) {
                    if let Some(filter_value) = state.env().get_filter(&node.name) {
                        let is_pure = filter_value
                            .as_callable()
                            .map_or(false, |callable| callable.is_pure());
                        if is_pure {
                            if let Ok(folded) = filter_value.call(state, &const_args) {
                                return make_const(folded, span);
                            }
                        }
                    }
                }
            }
            ast::Expr::Filter(Spanned::new(
                ast::Filter {
                    name: node.name,
                    expr: inner,
                    args,
                },
                span,
            ))
        }
        ast::Expr::GetItem(getitem) => {
            let (node, span) = getitem.into_parts();
            let obj = fold_expr(state, node.expr);
            let subscript = fold_expr(state, node.subscript_expr);
            if let (Some(obj_value), Some(key)) = (const_value(&obj), const_value(&subscript)) {
                if let Some(folded) = obj_value.get_item(&key) {
                    return make_const(folded, span);
                }
            }
            ast::Expr::GetItem(Spanned::new(
                ast::GetItem {
                    expr: obj,
                    subscript_expr: subscript,
                },
                span,
            ))
        }
        ast::Expr::List(list) => {
            let (node, span) = list.into_parts();
            let items: Vec<ast::Expr> = node
                .items
                .into_iter()
                .map(|expr| fold_expr(state, expr))
                .collect();
            let folded = ast::List { items };
            match folded.as_const() {
                Some(value) => make_const(value, span),
                None => ast::Expr::List(Spanned::new(folded, span)),
            }
        }
        ast::Expr::Map(map) => {
            let (node, span) = map.into_parts();
            let keys: Vec<ast::Expr> = node
                .keys
                .into_iter()
                .map(|expr| fold_expr(state, expr))
                .collect();
            let values: Vec<ast::Expr> = node
                .values
                .into_iter()
                .map(|expr| fold_expr(state, expr))
                .collect();
            let folded = ast::Map { keys, values };
            match folded.as_const() {
                Some(value) => make_const(value, span),
                None => ast::Expr::Map(Spanned::new(folded, span)),
            }
        }
        ast::Expr::Slice(slice) => {
            let (node, span) = slice.into_parts();
            ast::Expr::Slice(Spanned::new(
                ast::Slice {
                    expr: fold_expr(state, node.expr),
                    start: node.start.map(|expr| fold_expr(state, expr)),
                    stop: node.stop.map(|expr| fold_expr(state, expr)),
                    step: node.step.map(|expr| fold_expr(state, expr)),
                },
                span,
            ))
        }
        ast::Expr::GetAttr(getattr) => {
            let (node, span) = getattr.into_parts();
            ast::Expr::GetAttr(Spanned::new(
                ast::GetAttr {
                    expr: fold_expr(state, node.expr),
                    name: node.name,
                },
                span,
            ))
        }
        ast::Expr::Test(test) => {
            let (node, span) = test.into_parts();
            ast::Expr::Test(Spanned::new(
                ast::Test {
                    name: node.name,
                    expr: fold_expr(state, node.expr),
                    args: node
                        .args
                        .into_iter()
                        .map(|arg| match arg {
                            ast::CallArg::Pos(expr) => ast::CallArg::Pos(fold_expr(state, expr)),
                            ast::CallArg::Kwarg(name, expr) => {
                                ast::CallArg::Kwarg(name, fold_expr(state, expr))
                            }
                        })
                        .collect(),
                },
                span,
            ))
        }
        other => other,
    }
}
