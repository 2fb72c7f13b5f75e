use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::compiler::codegen::CodeGenerator;
use crate::compiler::instructions::Bytecode;
use crate::compiler::marshal::source_checksum;
use crate::compiler::optimizer::optimize;
use crate::compiler::parser::parse;
use crate::environment::Environment;
use crate::error::Error;
use crate::output::Output;
use crate::utils::AutoEscape;
use crate::value::Value;
use crate::vm::Vm;

/// Represents a handle to a template.
///
/// Templates are stored in the [`Environment`] as compiled bytecode.  With
/// the [`Environment::get_template`] method they are looked up and returned
/// in form of this handle.  Templates are cheap to copy as the compiled
/// form is shared behind a reference count.
#[derive(Clone)]
pub struct Template<'env> {
    env: &'env Environment,
    compiled: Arc<CompiledTemplate>,
    initial_auto_escape: AutoEscape,
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name())
            .field("initial_auto_escape", &self.initial_auto_escape)
            .finish()
    }
}

impl<'env> Template<'env> {
    pub(crate) fn new(
        env: &'env Environment,
        compiled: Arc<CompiledTemplate>,
        initial_auto_escape: AutoEscape,
    ) -> Template<'env> {
        Template {
            env,
            compiled,
            initial_auto_escape,
        }
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    /// Returns the source code of the template.
    pub fn source(&self) -> &str {
        &self.compiled.source
    }

    /// Returns the checksum of the template source.
    pub fn checksum(&self) -> u64 {
        self.compiled.checksum
    }

    /// Renders the template into a string.
    ///
    /// The provided value is used as the initial context for the template.
    /// It can be any object that implements [`Serialize`].  You can either
    /// create your own struct and derive `Serialize` for it or the
    /// [`context!`](crate::context) macro can be used to create an ad-hoc
    /// context.
    ///
    /// ```
    /// # use vinja::{Environment, context};
    /// # let mut env = Environment::new();
    /// # env.add_template("hello", "Hello {{ name }}!").unwrap();
    /// let tmpl = env.get_template("hello").unwrap();
    /// println!("{}", tmpl.render(context!(name => "John")).unwrap());
    /// ```
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        // reduce the total amount of code falling under monomorphization
        // into this function and share the rest in _render.
        self._render(Value::from_serializable(&ctx))
    }

    fn _render(&self, root: Value) -> Result<String, Error> {
        let mut rv = String::new();
        let mut out = Output::with_string(&mut rv);
        ok!(Vm::new(self.env).eval(&self.compiled, root, &mut out, self.initial_auto_escape));
        Ok(rv)
    }

    pub(crate) fn compiled(&self) -> &Arc<CompiledTemplate> {
        &self.compiled
    }
}

/// Represents a compiled template in memory.
pub struct CompiledTemplate {
    pub(crate) name: Arc<str>,
    pub(crate) source: String,
    pub(crate) checksum: u64,
    pub(crate) bytecode: Arc<Bytecode>,
    pub(crate) blocks: BTreeMap<Arc<str>, Arc<Bytecode>>,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("checksum", &self.checksum)
            .finish()
    }
}

impl CompiledTemplate {
    /// Parses, optimizes and compiles a template.
    pub(crate) fn new(
        name: &str,
        source: &str,
        env: &Environment,
    ) -> Result<CompiledTemplate, Error> {
        let ast = ok!(parse(
            source,
            name,
            env.syntax().clone(),
            env.ws_config().clone(),
            env.extensions().to_vec(),
        ));
        let state = env.empty_state();
        let ast = optimize(&state, ast);
        let mut generator = CodeGenerator::new(name);
        ok!(generator.compile_stmt(&ast));
        let (bytecode, blocks) = generator.finish();
        Ok(CompiledTemplate {
            name: Arc::from(name),
            source: source.to_string(),
            checksum: source_checksum(source),
            bytecode: Arc::new(bytecode),
            blocks: blocks
                .into_iter()
                .map(|(name, code)| (name, Arc::new(code)))
                .collect(),
        })
    }
}
