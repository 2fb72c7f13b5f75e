//! <div align=center>
//!   <p><strong>vinja: a Jinja2 compatible template engine with a bytecode VM</strong></p>
//! </div>
//!
//! vinja is a template engine for Rust which is based on the syntax and
//! behavior of the [Jinja2](https://jinja.palletsprojects.com/) template
//! engine for Python.  Templates are parsed into an AST, optimized, then
//! compiled into a compact bytecode form that a small stack based virtual
//! machine executes.  It's implemented on top of [`serde`] so any
//! serializable value can be passed as template context.
//!
//! ```jinja
//! {% for user in users %}
//!   <li>{{ user.name }}</li>
//! {% endfor %}
//! ```
//!
//! # Template Usage
//!
//! To use vinja one needs to create an [`Environment`] and populate it
//! with templates.  Afterwards templates can be loaded and rendered.  To
//! pass data one can pass any serde serializable value.  The [`context!`]
//! macro can be used to quickly construct a template context:
//!
//! ```
//! use vinja::{Environment, context};
//!
//! let mut env = Environment::new();
//! env.add_template("hello", "Hello {{ name }}!").unwrap();
//! let tmpl = env.get_template("hello").unwrap();
//! println!("{}", tmpl.render(context!(name => "John")).unwrap());
//! ```
//!
//! ```plain
//! Hello John!
//! ```
//!
//! # Expression Usage
//!
//! vinja — like Jinja2 — allows to be used as expression language.  This
//! can be useful to express logic in configuration files or similar
//! things.  For this purpose the [`Environment::compile_expression`]
//! method can be used.  It returns an expression object that can then be
//! evaluated, returning the result:
//!
//! ```
//! use vinja::{Environment, context};
//!
//! let env = Environment::new();
//! let expr = env.compile_expression("number < 42").unwrap();
//! let result = expr.eval(context!(number => 23)).unwrap();
//! assert_eq!(result.is_true(), true);
//! ```
//!
//! # Custom Filters
//!
//! vinja lets you register functions as filter functions (see
//! [`Filter`](crate::filters::Filter)) with the engine.  These can then
//! be invoked directly from the template:
//!
//! ```
//! use vinja::{Environment, State, Error, context};
//!
//! let mut env = Environment::new();
//! fn repeat(_state: &State, value: String, count: usize) -> Result<String, Error> {
//!     Ok(value.repeat(count))
//! }
//! env.add_filter("repeat", repeat);
//! env.add_template("hello", "{{ 'Na '|repeat(3) }} {{ name }}!").unwrap();
//! let tmpl = env.get_template("hello").unwrap();
//! println!("{}", tmpl.render(context!(name => "Batman")).unwrap());
//! ```
//!
//! ```plain
//! Na Na Na Batman!
//! ```
//!
//! # Learn more
//!
//! - [`Environment`]: the main API entry point.  Teaches you how to
//!   configure the environment.
//! - [`Template`]: the template object API.
//! - [`syntax`]: the delimiter configuration.
//! - [`filters`], [`tests`], [`functions`]: the builtin library and how
//!   to extend it.
//! - [`loader`]: pluggable template loaders.
//! - [`bccache`]: the persisted bytecode cache.
//! - [`sandbox`]: the security policy hook.
//! - [`extensions`]: custom parser tags.
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::get_first)]
#![deny(missing_docs)]

#[macro_use]
mod macros;

mod compiler;
mod environment;
mod error;
mod expression;
mod output;
mod template;
mod utils;
mod vm;

pub mod bccache;
pub mod cache;
pub mod extensions;
pub mod filters;
pub mod functions;
pub mod loader;
pub mod sandbox;
pub mod syntax;
pub mod tests;
pub mod value;

/// The abstract syntax tree of the template language.
///
/// These types are exposed so that [parser
/// extensions](crate::extensions) can compose statement nodes.
pub mod ast {
    pub use crate::compiler::ast::*;
}

pub use self::cache::CacheStats;
pub use self::defaults::default_auto_escape_callback;
pub use self::environment::Environment;
pub use self::error::{Error, ErrorKind};
pub use self::expression::Expression;
pub use self::output::Output;
pub use self::template::Template;
pub use self::utils::{AutoEscape, HtmlEscape};
pub use self::value::UndefinedPolicy;
pub use self::vm::State;

mod defaults;

pub use self::macros::__context;

/// This module gives access to the low level machinery.
///
/// It mostly exists for internal testing purposes and for debugging and
/// does not have a stable interface.
pub mod machinery {
    #![allow(missing_docs)]
    pub use crate::compiler::ast;
    pub use crate::compiler::codegen::CodeGenerator;
    pub use crate::compiler::instructions::{Bytecode, Instr};
    pub use crate::compiler::lexer::Tokenizer;
    pub use crate::compiler::marshal;
    pub use crate::compiler::optimizer::optimize;
    pub use crate::compiler::parser::{parse, parse_expr};
    pub use crate::compiler::tokens::{Span, Token};
    pub use crate::vm::Vm;
}
