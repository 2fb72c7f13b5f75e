use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::bccache::BytecodeCache;
use crate::cache::{CacheStats, TemplateCache, DEFAULT_CACHE_CAPACITY};
use crate::compiler::codegen::CodeGenerator;
use crate::compiler::marshal;
use crate::compiler::parser::parse_expr;
use crate::error::{Error, ErrorKind};
use crate::expression::Expression;
use crate::extensions::Extension;
use crate::filters;
use crate::loader::Loader;
use crate::output::Output;
use crate::sandbox::SecurityPolicy;
use crate::syntax::{SyntaxConfig, WhitespaceConfig};
use crate::template::{CompiledTemplate, Template};
use crate::tests;
use crate::utils::{write_escaped, AutoEscape};
use crate::value::{ArgType, FunctionArgs, UndefinedPolicy, Value};
use crate::vm::State;
use crate::defaults;

type AutoEscapeFunc = dyn Fn(&str) -> AutoEscape + Sync + Send;
type FinalizeFunc = dyn Fn(&State, &Value) -> Value + Sync + Send;

/// The maximum recursion in the VM.  Normally each stack frame adds one
/// to this counter; operations with a higher cost (includes, macro calls)
/// add more.
const MAX_RECURSION: usize = 500;

/// The default upper bound for the `range()` builtin.
const MAX_RANGE: usize = 100_000;

/// An abstraction that holds the engine configuration.
///
/// This object holds the central configuration state for templates.  It
/// is also the container for all loaded templates.
///
/// There are generally two ways to construct an environment:
///
/// * [`Environment::new`] creates an environment preconfigured with
///   sensible defaults.  It will contain all built-in filters, tests and
///   globals as well as a callback for auto escaping based on file
///   extension.
/// * [`Environment::empty`] creates a completely blank environment.
///
/// An environment that should be shared between threads is frozen with
/// [`into_shared`](Environment::into_shared) which returns an
/// [`Arc`]-backed handle.  Frozen environments can render concurrently
/// but can no longer be reconfigured.
pub struct Environment {
    templates: BTreeMap<Arc<str>, Arc<CompiledTemplate>>,
    cache: Mutex<TemplateCache>,
    loader: Option<Arc<dyn Loader>>,
    bytecode_cache: Option<Arc<dyn BytecodeCache>>,
    syntax: SyntaxConfig,
    ws_config: WhitespaceConfig,
    filters: Arc<BTreeMap<Arc<str>, Value>>,
    tests: Arc<BTreeMap<Arc<str>, Value>>,
    globals: Arc<BTreeMap<Arc<str>, Value>>,
    extensions: Vec<Arc<dyn Extension>>,
    extension_filters: BTreeMap<Arc<str>, Value>,
    extension_tests: BTreeMap<Arc<str>, Value>,
    default_auto_escape: Arc<AutoEscapeFunc>,
    finalize: Option<Arc<FinalizeFunc>>,
    undefined_policy: UndefinedPolicy,
    security_policy: Option<Arc<dyn SecurityPolicy>>,
    recursion_limit: usize,
    max_range: usize,
    auto_reload: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::empty()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .field("undefined_policy", &self.undefined_policy)
            .finish()
    }
}

impl Environment {
    /// Creates a new environment with sensible defaults.
    ///
    /// This environment does not yet contain any templates but it will
    /// have all the default filters, tests and globals loaded.  If you do
    /// not want any default configuration you can use the alternative
    /// [`empty`](Environment::empty) method.
    pub fn new() -> Environment {
        Environment {
            templates: BTreeMap::new(),
            cache: Mutex::new(TemplateCache::new(DEFAULT_CACHE_CAPACITY)),
            loader: None,
            bytecode_cache: None,
            syntax: SyntaxConfig::default(),
            ws_config: WhitespaceConfig::default(),
            filters: Arc::new(defaults::get_builtin_filters()),
            tests: Arc::new(defaults::get_builtin_tests()),
            globals: Arc::new(defaults::get_globals()),
            extensions: Vec::new(),
            extension_filters: BTreeMap::new(),
            extension_tests: BTreeMap::new(),
            default_auto_escape: Arc::new(defaults::default_auto_escape_callback),
            finalize: None,
            undefined_policy: UndefinedPolicy::default(),
            security_policy: None,
            recursion_limit: MAX_RECURSION,
            max_range: MAX_RANGE,
            auto_reload: false,
        }
    }

    /// Creates a completely empty environment.
    ///
    /// This environment has no filters, no templates, no globals and no
    /// default logic for auto escaping configured.
    pub fn empty() -> Environment {
        Environment {
            templates: BTreeMap::new(),
            cache: Mutex::new(TemplateCache::new(DEFAULT_CACHE_CAPACITY)),
            loader: None,
            bytecode_cache: None,
            syntax: SyntaxConfig::default(),
            ws_config: WhitespaceConfig::default(),
            filters: Arc::new(BTreeMap::new()),
            tests: Arc::new(BTreeMap::new()),
            globals: Arc::new(BTreeMap::new()),
            extensions: Vec::new(),
            extension_filters: BTreeMap::new(),
            extension_tests: BTreeMap::new(),
            default_auto_escape: Arc::new(defaults::no_auto_escape),
            finalize: None,
            undefined_policy: UndefinedPolicy::default(),
            security_policy: None,
            recursion_limit: MAX_RECURSION,
            max_range: MAX_RANGE,
            auto_reload: false,
        }
    }

    /// Freezes the environment into a shared handle.
    ///
    /// The returned handle can be cheaply cloned and moved across
    /// threads; concurrent template lookups and renders are safe.  The
    /// mutating configuration surface is statically unreachable through
    /// the handle.
    pub fn into_shared(self) -> Arc<Environment> {
        Arc::new(self)
    }

    /// Creates a derived environment.
    ///
    /// The overlay shares the filter, test and global registries with its
    /// parent by reference but owns its own template cache and can change
    /// syntax, whitespace behavior, auto escaping, the finalize callback
    /// and the undefined policy without affecting the parent.
    pub fn overlay(&self) -> Environment {
        Environment {
            templates: self.templates.clone(),
            cache: Mutex::new(TemplateCache::new(DEFAULT_CACHE_CAPACITY)),
            loader: self.loader.clone(),
            bytecode_cache: self.bytecode_cache.clone(),
            syntax: self.syntax.clone(),
            ws_config: self.ws_config.clone(),
            filters: self.filters.clone(),
            tests: self.tests.clone(),
            globals: self.globals.clone(),
            extensions: self.extensions.clone(),
            extension_filters: self.extension_filters.clone(),
            extension_tests: self.extension_tests.clone(),
            default_auto_escape: self.default_auto_escape.clone(),
            finalize: self.finalize.clone(),
            undefined_policy: self.undefined_policy,
            security_policy: self.security_policy.clone(),
            recursion_limit: self.recursion_limit,
            max_range: self.max_range,
            auto_reload: self.auto_reload,
        }
    }

    /// Loads a template from a string into the environment.
    ///
    /// The `name` parameter defines the name of the template which
    /// identifies it.  To look up a loaded template use the
    /// [`get_template`](Self::get_template) method.
    ///
    /// ```
    /// # use vinja::Environment;
    /// let mut env = Environment::new();
    /// env.add_template("index.html", "Hello {{ name }}!").unwrap();
    /// ```
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<(), Error> {
        let compiled = ok!(CompiledTemplate::new(name, source, self));
        self.templates.insert(Arc::from(name), Arc::new(compiled));
        Ok(())
    }

    /// Removes a template by name.
    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
        self.cache.lock().unwrap().invalidate(name);
    }

    /// Removes all stored templates and clears the cache.
    pub fn clear_templates(&mut self) {
        self.templates.clear();
        self.cache.lock().unwrap().clear();
    }

    /// Registers a template loader.
    ///
    /// When a template loader is registered, the environment gains the
    /// ability to dynamically load templates.  Loaded templates go
    /// through the LRU cache; when [`set_auto_reload`](Self::set_auto_reload)
    /// is enabled the loader's `uptodate` is consulted on cache hits.
    pub fn set_loader<L: Loader + 'static>(&mut self, loader: L) {
        self.loader = Some(Arc::new(loader));
    }

    /// Registers a bytecode cache.
    ///
    /// Compiled templates loaded through the loader are persisted to and
    /// restored from this cache, keyed by a stable hash of the template
    /// name and validated against the source checksum.
    pub fn set_bytecode_cache<C: BytecodeCache + 'static>(&mut self, cache: C) {
        self.bytecode_cache = Some(Arc::new(cache));
    }

    /// Enables or disables auto reloading of loader backed templates.
    pub fn set_auto_reload(&mut self, yes: bool) {
        self.auto_reload = yes;
    }

    /// Reconfigures the template cache capacity.
    pub fn set_cache_capacity(&mut self, capacity: usize) {
        let mut cache = self.cache.lock().unwrap();
        *cache = TemplateCache::new(capacity);
    }

    /// Returns the statistics of the template cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap().stats()
    }

    /// Sets the syntax (delimiter) configuration.
    ///
    /// This setting is used whenever a template is loaded into the
    /// environment.  Changing it at a later point only affects future
    /// templates.
    pub fn set_syntax(&mut self, syntax: SyntaxConfig) {
        self.syntax = syntax;
    }

    /// Returns the current syntax configuration.
    pub fn syntax(&self) -> &SyntaxConfig {
        &self.syntax
    }

    /// Remove the first newline after a block tag.
    pub fn set_trim_blocks(&mut self, yes: bool) {
        self.ws_config.trim_blocks = yes;
    }

    /// Remove leading whitespace on block tag lines.
    pub fn set_lstrip_blocks(&mut self, yes: bool) {
        self.ws_config.lstrip_blocks = yes;
    }

    /// Preserve the trailing newline when rendering templates.
    ///
    /// The default is `false`, which causes a single newline, if present,
    /// to be stripped from the end of the template.
    pub fn set_keep_trailing_newline(&mut self, yes: bool) {
        self.ws_config.keep_trailing_newline = yes;
    }

    /// Sets the newline sequence template data is normalized to.
    pub fn set_newline_sequence(&mut self, sequence: &'static str) {
        self.ws_config.newline_sequence = sequence;
    }

    pub(crate) fn ws_config(&self) -> &WhitespaceConfig {
        &self.ws_config
    }

    /// Changes the undefined policy.
    ///
    /// This changes the runtime behavior of undefined values in the
    /// engine.  The default is [`UndefinedPolicy::Lenient`].
    pub fn set_undefined_policy(&mut self, policy: UndefinedPolicy) {
        self.undefined_policy = policy;
    }

    /// Returns the current undefined policy.
    #[inline(always)]
    pub fn undefined_policy(&self) -> UndefinedPolicy {
        self.undefined_policy
    }

    /// Sets a security policy vetting attribute access and callables.
    pub fn set_security_policy(&mut self, policy: Arc<dyn SecurityPolicy>) {
        self.security_policy = Some(policy);
    }

    pub(crate) fn security_policy(&self) -> Option<&Arc<dyn SecurityPolicy>> {
        self.security_policy.as_ref()
    }

    /// Sets a new function to select the default auto escaping.
    ///
    /// This function is invoked when templates are loaded into the
    /// environment to determine the default auto escaping behavior.  The
    /// default implementation
    /// ([`default_auto_escape_callback`](crate::default_auto_escape_callback))
    /// turns on escaping depending on the file extension.
    ///
    /// ```
    /// # use vinja::{Environment, AutoEscape};
    /// # let mut env = Environment::new();
    /// env.set_auto_escape_callback(|name| {
    ///     if matches!(name.rsplit('.').next().unwrap_or(""), "html" | "htm" | "aspx") {
    ///         AutoEscape::Html
    ///     } else {
    ///         AutoEscape::None
    ///     }
    /// });
    /// ```
    pub fn set_auto_escape_callback<F>(&mut self, f: F)
    where
        F: Fn(&str) -> AutoEscape + 'static + Sync + Send,
    {
        self.default_auto_escape = Arc::new(f);
    }

    /// Sets a finalize callback.
    ///
    /// The callback is applied to every value right before it is written
    /// to the output and can substitute a different value.
    ///
    /// ```
    /// # use vinja::Environment;
    /// # use vinja::value::Value;
    /// # let mut env = Environment::new();
    /// env.set_finalize(|_state, value| {
    ///     if value.is_none() {
    ///         Value::from("")
    ///     } else {
    ///         value.clone()
    ///     }
    /// });
    /// # assert_eq!(env.render_str("{{ none }}", ()).unwrap(), "");
    /// ```
    pub fn set_finalize<F>(&mut self, f: F)
    where
        F: Fn(&State, &Value) -> Value + 'static + Sync + Send,
    {
        self.finalize = Some(Arc::new(f));
    }

    /// Reconfigures the runtime recursion limit.
    ///
    /// Every operation that requires recursion increments an internal
    /// counter; includes and macro calls count more than plain frames.
    /// The default is 500.
    pub fn set_recursion_limit(&mut self, level: usize) {
        self.recursion_limit = level;
    }

    /// Returns the current max recursion limit.
    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Reconfigures the maximum length of ranges produced by `range()`.
    pub fn set_max_range(&mut self, max_range: usize) {
        self.max_range = max_range;
    }

    /// Returns the maximum length of ranges produced by `range()`.
    pub fn max_range(&self) -> usize {
        self.max_range
    }

    /// Adds a new filter function.
    ///
    /// Filter functions are functions that can be applied to values in
    /// templates.  For details about filters have a look at
    /// [`filters`](crate::filters).
    pub fn add_filter<F, V, Rv, Args>(&mut self, name: &str, f: F)
    where
        F: filters::Filter<V, Rv, Args>,
        V: ArgType + 'static,
        Rv: Into<Value> + 'static,
        Args: FunctionArgs + 'static,
    {
        Arc::make_mut(&mut self.filters).insert(Arc::from(name), filters::make_filter(name, f));
    }

    /// Removes a filter by name.
    pub fn remove_filter(&mut self, name: &str) {
        Arc::make_mut(&mut self.filters).remove(name);
    }

    /// Adds a new test function.
    ///
    /// Test functions are similar to filters but perform a check on a
    /// value where the return value is always true or false.  For details
    /// have a look at [`tests`](crate::tests).
    pub fn add_test<F, V, Args>(&mut self, name: &str, f: F)
    where
        F: tests::Test<V, Args>,
        V: ArgType + 'static,
        Args: FunctionArgs + 'static,
    {
        Arc::make_mut(&mut self.tests).insert(Arc::from(name), tests::make_test(name, f));
    }

    /// Removes a test by name.
    pub fn remove_test(&mut self, name: &str) {
        Arc::make_mut(&mut self.tests).remove(name);
    }

    /// Adds a new global function.
    ///
    /// Functions registered this way receive the [`State`] and the raw
    /// argument slice; see [`functions`](crate::functions) for details.
    /// Note that functions and other global variables share the same
    /// namespace.
    pub fn add_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&State, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.add_global(name, Value::from_function(name, f));
    }

    /// Adds a global variable.
    pub fn add_global<V: Into<Value>>(&mut self, name: &str, value: V) {
        Arc::make_mut(&mut self.globals).insert(Arc::from(name), value.into());
    }

    /// Removes a global function or variable by name.
    pub fn remove_global(&mut self, name: &str) {
        Arc::make_mut(&mut self.globals).remove(name);
    }

    /// Returns an iterator of all global variables.
    pub fn globals(&self) -> impl Iterator<Item = (&str, Value)> {
        self.globals
            .iter()
            .map(|(key, value)| (key as &str, value.clone()))
    }

    /// Registers a parser extension.
    ///
    /// Extensions are consulted in priority order (lower first) when the
    /// parser encounters an unknown tag.  Filters and tests contributed
    /// by extensions never shadow builtins or user registered entries.
    pub fn register_extension(&mut self, extension: Arc<dyn Extension>) {
        for (name, value) in extension.filters() {
            self.extension_filters.insert(Arc::from(name), value);
        }
        for (name, value) in extension.tests() {
            self.extension_tests.insert(Arc::from(name), value);
        }
        self.extensions.push(extension);
        self.extensions.sort_by_key(|ext| ext.priority());
    }

    pub(crate) fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// Fetches a template by name.
    ///
    /// This requires that the template has been loaded with
    /// [`add_template`](Environment::add_template) beforehand or that a
    /// loader knows it.  If the template was not found an error of kind
    /// `TemplateNotFound` is returned.
    ///
    /// ```
    /// # use vinja::{Environment, context};
    /// let mut env = Environment::new();
    /// env.add_template("hello.txt", "Hello {{ name }}!").unwrap();
    /// let tmpl = env.get_template("hello.txt").unwrap();
    /// println!("{}", tmpl.render(context!(name => "World")).unwrap());
    /// ```
    pub fn get_template(&self, name: &str) -> Result<Template<'_>, Error> {
        if let Some(compiled) = self.templates.get(name) {
            return Ok(Template::new(
                self,
                compiled.clone(),
                self.initial_auto_escape(name),
            ));
        }

        let loader = match self.loader {
            Some(ref loader) => loader.clone(),
            None => return Err(Error::new_not_found(name)),
        };

        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(cached) = cache.get(name) {
                let stale = self.auto_reload && !loader.uptodate(name, cached.last_modified);
                if stale {
                    cache.invalidate(name);
                } else {
                    return Ok(Template::new(
                        self,
                        cached.template,
                        self.initial_auto_escape(name),
                    ));
                }
            }
        }

        let loaded = ok!(loader.load(name));
        let checksum = marshal::source_checksum(&loaded.source);
        let key = marshal::cache_key(name, loaded.filename.as_ref().and_then(|x| x.to_str()));

        let mut compiled = None;
        if let Some(ref bytecode_cache) = self.bytecode_cache {
            if let Some(payload) = bytecode_cache.load_bucket(key, checksum) {
                compiled = marshal::deserialize(&payload, checksum, &loaded.source);
            }
        }
        let compiled = match compiled {
            Some(compiled) => Arc::new(compiled),
            None => {
                let compiled = ok!(CompiledTemplate::new(name, &loaded.source, self));
                if let Some(ref bytecode_cache) = self.bytecode_cache {
                    bytecode_cache.dump_bucket(key, checksum, &marshal::serialize(&compiled));
                }
                Arc::new(compiled)
            }
        };

        self.cache
            .lock()
            .unwrap()
            .put(name, compiled.clone(), loaded.last_modified);
        Ok(Template::new(
            self,
            compiled,
            self.initial_auto_escape(name),
        ))
    }

    /// Lists all templates known to the environment and its loader.
    pub fn list_templates(&self) -> Vec<String> {
        let mut rv: Vec<String> = self.templates.keys().map(|x| x.to_string()).collect();
        if let Some(ref loader) = self.loader {
            if let Some(names) = loader.list_templates() {
                rv.extend(names);
            }
        }
        rv.sort();
        rv.dedup();
        rv
    }

    /// Loads a template from a string.
    ///
    /// In some cases you really only need to work with (eg: render) a
    /// template to be rendered once only.  Templates created this way are
    /// not cached.
    ///
    /// ```
    /// # use vinja::{Environment, context};
    /// let env = Environment::new();
    /// let tmpl = env.template_from_named_str("template_name", "Hello {{ name }}").unwrap();
    /// let rv = tmpl.render(context!(name => "World"));
    /// println!("{}", rv.unwrap());
    /// ```
    pub fn template_from_named_str(&self, name: &str, source: &str) -> Result<Template<'_>, Error> {
        Ok(Template::new(
            self,
            Arc::new(ok!(CompiledTemplate::new(name, source, self))),
            self.initial_auto_escape(name),
        ))
    }

    /// Loads a template from a string, with name `<string>`.
    ///
    /// This is a shortcut to
    /// [`template_from_named_str`](Self::template_from_named_str) with
    /// name set to `<string>`.
    pub fn template_from_str(&self, source: &str) -> Result<Template<'_>, Error> {
        self.template_from_named_str("<string>", source)
    }

    /// Parses and renders a template from a string in one go with name.
    ///
    /// **Note on values:** The [`Value`] type implements `Serialize` and
    /// can be efficiently passed to render.  It does not undergo actual
    /// serialization.
    pub fn render_named_str<S: Serialize>(
        &self,
        name: &str,
        source: &str,
        ctx: S,
    ) -> Result<String, Error> {
        ok!(self.template_from_named_str(name, source)).render(ctx)
    }

    /// Parses and renders a template from a string in one go.
    ///
    /// In some cases you really only need a template to be rendered once
    /// from a string and returned.  The internal name of the template is
    /// `<string>`.
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, Error> {
        ok!(self.template_from_str(source)).render(ctx)
    }

    /// Compiles an expression.
    ///
    /// This lets one compile an expression in the template language and
    /// receive the output.  This lets one use the expressions of the
    /// language as a minimal scripting language.  For more information
    /// see [`Expression`].
    ///
    /// ```
    /// # use vinja::{Environment, context};
    /// let env = Environment::new();
    /// let expr = env.compile_expression("number < 42").unwrap();
    /// let result = expr.eval(context!(number => 23)).unwrap();
    /// assert!(result.is_true());
    /// ```
    pub fn compile_expression(&self, expr: &str) -> Result<Expression<'_>, Error> {
        let ast = ok!(parse_expr(expr));
        let mut generator = CodeGenerator::new("<expression>");
        ok!(generator.compile_expr(&ast));
        let (bytecode, _) = generator.finish();
        Ok(Expression::new(self, Arc::new(bytecode)))
    }

    /// Returns an empty [`State`] for testing purposes and similar.
    pub fn empty_state(&self) -> State<'_> {
        State::new_for_env(self)
    }

    /// Looks up a filter.
    pub(crate) fn get_filter(&self, name: &str) -> Option<Value> {
        self.filters
            .get(name)
            .or_else(|| self.extension_filters.get(name))
            .cloned()
    }

    /// Looks up a test function.
    pub(crate) fn get_test(&self, name: &str) -> Option<Value> {
        self.tests
            .get(name)
            .or_else(|| self.extension_tests.get(name))
            .cloned()
    }

    /// Looks up a global.
    pub(crate) fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    pub(crate) fn initial_auto_escape(&self, name: &str) -> AutoEscape {
        (self.default_auto_escape)(name)
    }

    /// Formats a value into the final output.
    ///
    /// This applies the finalize callback, enforces the strict undefined
    /// policy and writes with the current auto escape setting.
    pub(crate) fn format(
        &self,
        value: &Value,
        state: &State,
        out: &mut Output,
    ) -> Result<(), Error> {
        let finalized;
        let value = match self.finalize {
            Some(ref finalize) => {
                finalized = finalize(state, value);
                &finalized
            }
            None => value,
        };
        if value.undefined_policy() == Some(UndefinedPolicy::Strict) {
            return Err(match value.undefined_name() {
                Some(name) => Error::new(
                    ErrorKind::UndefinedError,
                    format!("{name} is undefined"),
                ),
                None => Error::from(ErrorKind::UndefinedError),
            });
        }
        write_escaped(out, state.auto_escape(), value)
    }
}
