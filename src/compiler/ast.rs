#![allow(missing_docs)]

use std::ops::Deref;

use crate::compiler::tokens::Span;
use crate::value::Value;

/// Container for nodes with location info.
///
/// This container fulfills two purposes: it adds location information to
/// nodes, but it also ensures the node is heap allocated.  The latter is
/// useful to ensure that enum variants do not cause the enum to become too
/// large.
#[derive(Debug)]
pub struct Spanned<T> {
    node: Box<T>,
    span: Span,
}

impl<T> Spanned<T> {
    /// Creates a new spanned node.
    pub fn new(node: T, span: Span) -> Spanned<T> {
        Spanned {
            node: Box::new(node),
            span,
        }
    }

    /// Accesses the span.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Unwraps the node and its span.
    pub fn into_parts(self) -> (T, Span) {
        (*self.node, self.span)
    }
}

impl<T> Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl<T> std::ops::DerefMut for Spanned<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.node
    }
}

/// A statement node.
#[derive(Debug)]
pub enum Stmt {
    Template(Spanned<Template>),
    EmitExpr(Spanned<EmitExpr>),
    EmitRaw(Spanned<EmitRaw>),
    ForLoop(Spanned<ForLoop>),
    IfCond(Spanned<IfCond>),
    WithBlock(Spanned<WithBlock>),
    Set(Spanned<Set>),
    SetBlock(Spanned<SetBlock>),
    AutoEscape(Spanned<AutoEscape>),
    FilterBlock(Spanned<FilterBlock>),
    Block(Spanned<Block>),
    Extends(Spanned<Extends>),
    Include(Spanned<Include>),
    Import(Spanned<Import>),
    FromImport(Spanned<FromImport>),
    Macro(Spanned<Macro>),
    CallBlock(Spanned<CallBlock>),
    Do(Spanned<Do>),
    Break(Spanned<Break>),
    Continue(Spanned<Continue>),
    Debug(Spanned<Debug>),
}

/// An expression node.
#[allow(clippy::enum_variant_names)]
#[derive(Debug)]
pub enum Expr {
    Var(Spanned<Var>),
    Const(Spanned<Const>),
    Slice(Spanned<Slice>),
    UnaryOp(Spanned<UnaryOp>),
    BinOp(Spanned<BinOp>),
    Compare(Spanned<Compare>),
    IfExpr(Spanned<IfExpr>),
    Filter(Spanned<Filter>),
    Test(Spanned<Test>),
    GetAttr(Spanned<GetAttr>),
    GetItem(Spanned<GetItem>),
    Call(Spanned<Call>),
    List(Spanned<List>),
    Map(Spanned<Map>),
}

impl Expr {
    /// Returns a short description of the expression.
    pub fn description(&self) -> &'static str {
        match self {
            Expr::Var(_) => "variable",
            Expr::Const(_) => "constant",
            Expr::Slice(_) => "slice",
            Expr::UnaryOp(_) => "unary operator",
            Expr::BinOp(_) => "binary operator",
            Expr::Compare(_) => "comparison",
            Expr::IfExpr(_) => "if expression",
            Expr::Filter(_) => "filter expression",
            Expr::Test(_) => "test expression",
            Expr::GetAttr(_) => "attribute lookup",
            Expr::GetItem(_) => "subscript",
            Expr::Call(_) => "call",
            Expr::List(_) => "list literal",
            Expr::Map(_) => "map literal",
        }
    }

    /// Returns the span of the expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Var(s) => s.span(),
            Expr::Const(s) => s.span(),
            Expr::Slice(s) => s.span(),
            Expr::UnaryOp(s) => s.span(),
            Expr::BinOp(s) => s.span(),
            Expr::Compare(s) => s.span(),
            Expr::IfExpr(s) => s.span(),
            Expr::Filter(s) => s.span(),
            Expr::Test(s) => s.span(),
            Expr::GetAttr(s) => s.span(),
            Expr::GetItem(s) => s.span(),
            Expr::Call(s) => s.span(),
            Expr::List(s) => s.span(),
            Expr::Map(s) => s.span(),
        }
    }

    /// If the expression is a constant, returns the value.
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Expr::Const(c) => Some(&c.value),
            _ => None,
        }
    }
}

/// Root template node.
#[derive(Debug)]
pub struct Template {
    pub children: Vec<Stmt>,
}

/// A for loop.
#[derive(Debug)]
pub struct ForLoop {
    pub target: Expr,
    pub iter: Expr,
    pub filter_expr: Option<Expr>,
    pub recursive: bool,
    pub body: Vec<Stmt>,
    pub else_body: Vec<Stmt>,
}

/// An if/else condition.
#[derive(Debug)]
pub struct IfCond {
    pub expr: Expr,
    pub true_body: Vec<Stmt>,
    pub false_body: Vec<Stmt>,
}

/// A with block.
#[derive(Debug)]
pub struct WithBlock {
    pub assignments: Vec<(Expr, Expr)>,
    pub body: Vec<Stmt>,
}

/// A set statement.
#[derive(Debug)]
pub struct Set {
    pub target: Expr,
    pub expr: Expr,
}

/// A set capture statement.
#[derive(Debug)]
pub struct SetBlock {
    pub target: Expr,
    pub filter: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// A block for inheritance elements.
#[derive(Debug)]
pub struct Block {
    pub name: String,
    pub body: Vec<Stmt>,
}

/// An extends statement.
#[derive(Debug)]
pub struct Extends {
    pub name: Expr,
}

/// An include statement.
#[derive(Debug)]
pub struct Include {
    pub name: Expr,
    pub ignore_missing: bool,
    pub with_context: bool,
}

/// A full module import.
#[derive(Debug)]
pub struct Import {
    pub expr: Expr,
    pub name: Expr,
}

/// A "from" import.
#[derive(Debug)]
pub struct FromImport {
    pub expr: Expr,
    pub names: Vec<(Expr, Option<Expr>)>,
}

/// An auto escape control block.
#[derive(Debug)]
pub struct AutoEscape {
    pub enabled: Expr,
    pub body: Vec<Stmt>,
}

/// Applies filters to a block.
#[derive(Debug)]
pub struct FilterBlock {
    pub filter: Expr,
    pub body: Vec<Stmt>,
}

/// Declares a macro.
#[derive(Debug)]
pub struct Macro {
    pub name: String,
    pub args: Vec<Expr>,
    pub defaults: Vec<Expr>,
    pub body: Vec<Stmt>,
}

/// A call block (`{% call %}`).
#[derive(Debug)]
pub struct CallBlock {
    pub call: Spanned<Call>,
    pub macro_decl: Spanned<Macro>,
}

/// A do statement evaluating an expression for its side effect.
#[derive(Debug)]
pub struct Do {
    pub call: Spanned<Call>,
}

/// Breaks out of the nearest loop.
#[derive(Debug)]
pub struct Break;

/// Continues with the next loop iteration.
#[derive(Debug)]
pub struct Continue;

/// Dumps the current context state for debugging.
#[derive(Debug)]
pub struct Debug;

/// Outputs the expression.
#[derive(Debug)]
pub struct EmitExpr {
    pub expr: Expr,
}

/// Outputs raw template data.
#[derive(Debug)]
pub struct EmitRaw {
    pub raw: String,
}

/// Looks up a variable.
#[derive(Debug)]
pub struct Var {
    pub id: String,
}

/// Loads a constant.
#[derive(Debug)]
pub struct Const {
    pub value: Value,
}

/// Represents a slice.
#[derive(Debug)]
pub struct Slice {
    pub expr: Expr,
    pub start: Option<Expr>,
    pub stop: Option<Expr>,
    pub step: Option<Expr>,
}

/// A kind of unary operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Neg,
}

/// An unary operator expression.
#[derive(Debug)]
pub struct UnaryOp {
    pub op: UnaryOpKind,
    pub expr: Expr,
}

/// A kind of binary operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinOpKind {
    ScAnd,
    ScOr,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
    Concat,
}

/// A binary operator expression.
#[derive(Debug)]
pub struct BinOp {
    pub op: BinOpKind,
    pub left: Expr,
    pub right: Expr,
}

/// A comparison operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

/// A (potentially chained) comparison expression.
///
/// `a < b < c` evaluates as `(a < b) and (b < c)` with `b` evaluated once.
#[derive(Debug)]
pub struct Compare {
    pub expr: Expr,
    pub ops: Vec<(CmpOp, Expr)>,
}

/// An if expression.
#[derive(Debug)]
pub struct IfExpr {
    pub test_expr: Expr,
    pub true_expr: Expr,
    pub false_expr: Option<Expr>,
}

/// A filter expression.
#[derive(Debug)]
pub struct Filter {
    pub name: String,
    pub expr: Option<Expr>,
    pub args: Vec<CallArg>,
}

/// A test expression.
#[derive(Debug)]
pub struct Test {
    pub name: String,
    pub expr: Expr,
    pub args: Vec<CallArg>,
}

/// An attribute lookup expression.
#[derive(Debug)]
pub struct GetAttr {
    pub expr: Expr,
    pub name: String,
}

/// An item lookup expression.
#[derive(Debug)]
pub struct GetItem {
    pub expr: Expr,
    pub subscript_expr: Expr,
}

/// A call argument.
#[derive(Debug)]
pub enum CallArg {
    /// A positional argument.
    Pos(Expr),
    /// A keyword argument.
    Kwarg(String, Expr),
}

/// Calls something.
#[derive(Debug)]
pub struct Call {
    pub expr: Expr,
    pub args: Vec<CallArg>,
}

/// Defines the specific type of call.
#[derive(Debug)]
pub enum CallType<'ast> {
    Function(&'ast str),
    Method(&'ast Expr, &'ast str),
    Object(&'ast Expr),
}

impl Call {
    /// Try to isolate a method call.
    ///
    /// name + call and attribute lookup + call are really method calls
    /// which are easier to handle for the compiler as a separate thing.
    pub fn identify_call(&self) -> CallType<'_> {
        match self.expr {
            Expr::Var(ref var) => CallType::Function(&var.id),
            Expr::GetAttr(ref attr) => CallType::Method(&attr.expr, &attr.name),
            _ => CallType::Object(&self.expr),
        }
    }
}

/// Creates a list of values.
#[derive(Debug)]
pub struct List {
    pub items: Vec<Expr>,
}

impl List {
    pub fn as_const(&self) -> Option<Value> {
        if !self.items.iter().all(|x| matches!(x, Expr::Const(_))) {
            return None;
        }

        let mut rv = Vec::with_capacity(self.items.len());
        for expr in &self.items {
            if let Expr::Const(val) = expr {
                rv.push(val.value.clone());
            }
        }

        Some(Value::from(rv))
    }
}

/// Creates a map of values.
#[derive(Debug)]
pub struct Map {
    pub keys: Vec<Expr>,
    pub values: Vec<Expr>,
}

impl Map {
    pub fn as_const(&self) -> Option<Value> {
        if !self.keys.iter().all(|x| matches!(x, Expr::Const(_)))
            || !self.values.iter().all(|x| matches!(x, Expr::Const(_)))
        {
            return None;
        }

        let mut rv = crate::value::ValueMap::new();
        for (key, value) in self.keys.iter().zip(self.values.iter()) {
            if let (Expr::Const(key), Expr::Const(value)) = (key, value) {
                rv.insert(key.value.as_dict_key(), value.value.clone());
            }
        }

        Some(Value::from_value_map(rv))
    }
}
