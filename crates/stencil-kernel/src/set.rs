//! Template sets: loading, caching and executing templates.
//!
//! A [`Set`] owns everything a render needs besides the data: the loader,
//! the cache, the variable environment, the delimiters and the escaper.
//! Sets are meant to be built once and shared between threads.

use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use indexmap::IndexMap;
use regex::Regex;

use crate::ast::{free_identifiers, Node};
use crate::cache::{Cache, InMemCache};
use crate::env::Environment;
use crate::error::{Error, Result, RuntimeError, RuntimeReason};
use crate::escape::{html_escaper, SafeWriter};
use crate::interpreter::{Flow, Runtime, RuntimeState};
use crate::lexer::Delims;
use crate::loader::{canonical_path, dir_of, Loader};
use crate::parser::{self, Reference};
use crate::template::Template;
use crate::value::Value;

/// Extensions tried, in order, when resolving a template name.
pub const DEFAULT_EXTENSIONS: [&str; 4] = ["", ".jet", ".html.jet", ".jet.html"];

/// Default bound on nested include, yield and exec depth.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Variables bound in the root scope of one render.
#[derive(Debug, Clone, Default)]
pub struct VarMap(IndexMap<String, Value>);

impl VarMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Configures and builds a [`Set`].
pub struct SetBuilder {
    loader: Arc<dyn Loader>,
    cache: Arc<dyn Cache>,
    env: Environment,
    delims: Delims,
    extensions: Vec<String>,
    development: bool,
    escaper: Option<SafeWriter>,
    max_depth: usize,
}

impl SetBuilder {
    pub fn new(loader: impl Loader + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            cache: Arc::new(InMemCache::new()),
            env: Environment::new(),
            delims: Delims::default(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            development: false,
            escaper: Some(html_escaper()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn cache(mut self, cache: impl Cache + 'static) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn delimiters(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.delims = Delims::new(left, right);
        self
    }

    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// In development mode the cache is never read, so edited templates
    /// are picked up on the next load.
    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    /// Escaper for printed values; `None` writes them verbatim.
    pub fn escaper(mut self, escaper: Option<SafeWriter>) -> Self {
        self.escaper = escaper;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Replace the environment, builtins included.
    pub fn environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Add a variable visible to every template.
    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.env.set_default(name, value);
        self
    }

    pub fn build(self) -> Result<Set> {
        let Delims { left, right } = &self.delims;
        if left.is_empty() || right.is_empty() {
            return Err(Error::Config("delimiters must not be empty".into()));
        }
        if left.chars().chain(right.chars()).any(char::is_whitespace) {
            return Err(Error::Config(format!(
                "delimiters must not contain whitespace: {left:?} {right:?}"
            )));
        }
        if self.extensions.is_empty() {
            return Err(Error::Config("at least one extension is required".into()));
        }
        let pattern = format!(
            r"(?s){}-?\s*(.*?)\s*-?{}",
            regex::escape(left),
            regex::escape(right)
        );
        let placeholder = Regex::new(&pattern).map_err(|e| Error::Config(e.to_string()))?;

        Ok(Set {
            loader: self.loader,
            cache: self.cache,
            env: self.env,
            delims: self.delims,
            extensions: self.extensions,
            development: self.development,
            escaper: self.escaper,
            max_depth: self.max_depth,
            placeholder,
            pool: Mutex::new(Vec::new()),
        })
    }
}

/// A collection of templates sharing a loader, cache and environment.
pub struct Set {
    loader: Arc<dyn Loader>,
    cache: Arc<dyn Cache>,
    env: Environment,
    delims: Delims,
    extensions: Vec<String>,
    development: bool,
    escaper: Option<SafeWriter>,
    max_depth: usize,
    placeholder: Regex,
    pool: Mutex<Vec<RuntimeState>>,
}

impl Set {
    pub fn builder(loader: impl Loader + 'static) -> SetBuilder {
        SetBuilder::new(loader)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Loading
    // ═══════════════════════════════════════════════════════════════════

    /// Load, parse and cache a template by name.
    ///
    /// The name is resolved against `/` and tried with each extension in
    /// turn.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>> {
        let path = canonical_path("/", name);
        self.resolve(&path, &mut Vec::new(), true)
    }

    /// Load a template relative to the directory of `from`.
    pub fn get_sibling(&self, from: &str, name: &str) -> Result<Arc<Template>> {
        let path = canonical_path(dir_of(from), name);
        self.resolve(&path, &mut Vec::new(), true)
    }

    /// Parse `source` as a one-off template named `name`. The result is not
    /// cached, nor are templates it extends or imports that were not cached
    /// already.
    pub fn parse(&self, name: &str, source: &str) -> Result<Arc<Template>> {
        let path = canonical_path("/", name);
        let mut stack = vec![path.clone()];
        self.parse_source(&path, source, &mut stack, false)
    }

    fn resolve(&self, path: &str, stack: &mut Vec<String>, cache: bool) -> Result<Arc<Template>> {
        for ext in &self.extensions {
            let candidate = format!("{path}{ext}");
            if !self.development {
                if let Some(template) = self.cache.get(&candidate) {
                    tracing::trace!(template = %candidate, "cache hit");
                    return Ok(template);
                }
            }
            if self.loader.exists(&candidate) {
                return self.load(&candidate, stack, cache);
            }
        }
        Err(Error::NotFound(path.to_string()))
    }

    fn load(&self, path: &str, stack: &mut Vec<String>, cache: bool) -> Result<Arc<Template>> {
        if stack.iter().any(|p| p == path) {
            return Err(Error::Cycle(path.to_string()));
        }
        let mut source = String::new();
        self.loader
            .open(path)
            .and_then(|mut reader| reader.read_to_string(&mut source))
            .map_err(|source| Error::Io {
                path: path.to_string(),
                source,
            })?;

        stack.push(path.to_string());
        let result = self.parse_source(path, &source, stack, cache);
        stack.pop();
        let template = result?;

        if cache {
            self.cache.put(path, template.clone());
        }
        Ok(template)
    }

    fn parse_source(
        &self,
        path: &str,
        source: &str,
        stack: &mut Vec<String>,
        cache: bool,
    ) -> Result<Arc<Template>> {
        let started = Instant::now();
        let parsed = parser::parse(path, source, &self.delims)?;
        tracing::debug!(
            template = %path,
            elapsed_us = started.elapsed().as_micros() as u64,
            blocks = parsed.blocks.len(),
            "parsed template"
        );

        let dir = dir_of(path);
        let mut link = |reference: &Reference| {
            self.resolve(&canonical_path(dir, &reference.path), stack, cache)
        };
        let extends = parsed.extends.as_ref().map(&mut link).transpose()?;
        let imports = parsed
            .imports
            .iter()
            .map(&mut link)
            .collect::<Result<Vec<_>>>()?;

        Ok(Arc::new(Template::assemble(parsed, extends, imports)))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Executing
    // ═══════════════════════════════════════════════════════════════════

    /// Render `template` into `out` with `context` as `.`.
    ///
    /// Returns the value of a top-level `return`, if one ran.
    #[tracing::instrument(level = "debug", skip_all, fields(template = %template.name()))]
    pub fn execute(
        &self,
        template: &Template,
        out: &mut dyn Write,
        vars: &VarMap,
        context: Value,
    ) -> Result<Option<Value>, RuntimeError> {
        let mut state = self.checkout();
        state.reset(Some(template.blocks().clone()));
        for (name, value) in vars.iter() {
            state.scopes.let_var(name.clone(), value.clone());
        }

        let root = template.root_template();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut runtime = Runtime::new(self, &mut state, out, context, root.name_arc());
            runtime.exec_list(root.root())
        }));
        self.checkin(state);

        match result {
            Ok(Ok(Flow::Return(value))) => Ok(Some(value)),
            Ok(Ok(Flow::Normal)) => Ok(None),
            Ok(Err(err)) => Err(err),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!(template = %template.name(), %message, "render panicked");
                let mut err = RuntimeError::new(RuntimeReason::Panic, message);
                err.template = root.name().to_string();
                Err(err)
            }
        }
    }

    /// Load `name` and render it to a string.
    pub fn render(&self, name: &str, vars: &VarMap, context: Value) -> Result<String> {
        let template = self.get_template(name)?;
        let mut out = Vec::new();
        self.execute(&template, &mut out, vars, context)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn checkout(&self) -> RuntimeState {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        pool.pop().unwrap_or_default()
    }

    fn checkin(&self, mut state: RuntimeState) {
        state.reset(None);
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        pool.push(state);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Accessors and inspection
    // ═══════════════════════════════════════════════════════════════════

    /// Add or replace a global visible to every render.
    pub fn add_global(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.env.add_global(name, value);
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn escaper(&self) -> Option<&SafeWriter> {
        self.escaper.as_ref()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn delimiters(&self) -> &Delims {
        &self.delims
    }

    pub fn is_development(&self) -> bool {
        self.development
    }

    /// The trimmed body of every action in `source`, in order.
    pub fn placeholders<'s>(&self, source: &'s str) -> Vec<&'s str> {
        self.placeholder
            .captures_iter(source)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect()
    }

    /// Variables `source` reads that neither it nor the environment
    /// defines.
    pub fn variable_names(&self, name: &str, source: &str) -> Result<Vec<String>> {
        let parsed = parser::parse(name, source, &self.delims)?;
        Ok(self.unbound(&parsed.root))
    }

    /// Like [`variable_names`](Self::variable_names), for a loaded template.
    pub fn template_variables(&self, template: &Template) -> Vec<String> {
        self.unbound(template.root())
    }

    fn unbound(&self, nodes: &[Node]) -> Vec<String> {
        free_identifiers(nodes)
            .into_iter()
            .filter(|name| self.env.lookup(name).is_none())
            .collect()
    }
}

impl std::fmt::Debug for Set {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Set")
            .field("delims", &self.delims)
            .field("extensions", &self.extensions)
            .field("development", &self.development)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemLoader;

    fn set_with(files: &[(&str, &str)]) -> Set {
        let loader = InMemLoader::new();
        for (path, source) in files {
            loader.set(path, *source).unwrap();
        }
        Set::builder(loader).build().unwrap()
    }

    #[test]
    fn extensions_are_tried_in_order() {
        let set = set_with(&[("/page.jet", "jet"), ("/page.html.jet", "html")]);
        assert_eq!(set.get_template("page").unwrap().name(), "/page.jet");
        assert_eq!(set.get_template("/page.html").unwrap().name(), "/page.html.jet");
    }

    #[test]
    fn missing_templates_are_not_found() {
        let set = set_with(&[]);
        assert!(matches!(set.get_template("nope"), Err(Error::NotFound(p)) if p == "/nope"));
    }

    #[test]
    fn loaded_templates_are_cached() {
        let set = set_with(&[("/a.jet", "a")]);
        let first = set.get_template("a.jet").unwrap();
        let second = set.get_template("/a.jet").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn one_off_parses_are_not_cached() {
        let set = set_with(&[]);
        set.parse("/inline.jet", "x").unwrap();
        assert!(set.get_template("/inline.jet").is_err());
    }

    #[test]
    fn extends_cycles_are_reported() {
        let set = set_with(&[
            ("/a.jet", "{{ extends \"b.jet\" }}"),
            ("/b.jet", "{{ extends \"a.jet\" }}"),
        ]);
        assert!(matches!(set.get_template("/a.jet"), Err(Error::Cycle(p)) if p == "/a.jet"));
    }

    #[test]
    fn bad_delimiters_are_rejected() {
        let result = Set::builder(InMemLoader::new()).delimiters("", "}}").build();
        assert!(matches!(result, Err(Error::Config(_))));
        let result = Set::builder(InMemLoader::new()).delimiters("< %", "%>").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn placeholders_follow_delimiters() {
        let set = Set::builder(InMemLoader::new())
            .delimiters("[[", "]]")
            .build()
            .unwrap();
        assert_eq!(
            set.placeholders("a [[ .Name ]] b [[- x -]]"),
            vec![".Name", "x"]
        );
    }

    #[test]
    fn variable_names_skip_declared_and_builtin_names() {
        let set = set_with(&[]);
        let names = set
            .variable_names("/t", "{{ x := 1 }}{{ x }}{{ user.Name }}{{ len(items) }}")
            .unwrap();
        assert_eq!(names, vec!["items".to_string(), "user".to_string()]);
    }
}
