//! The tree-walking renderer.
//!
//! A [`Runtime`] executes one template against a context value, writing
//! text through the set's escaper. Statement execution returns a [`Flow`]
//! so `return` can stop the enclosing list without unwinding; errors travel
//! as [`RuntimeError`] and pick up their location on the way out.

use std::io::{self, Write};
use std::mem;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};

use crate::ast::*;
use crate::error::{Error, RuntimeError, RuntimeReason};
use crate::set::Set;
use crate::template::Template;
use crate::value::{FuncKind, Record, RecordType, Value};

use super::call::{callable, slots, Slot};
use super::ops;
use super::ranger::{ranger_for, Ranger};
use super::resolve::{assign_path, lookup, resolve_index, resolve_path, slice};
use super::scope::{BlockMap, ScopeId, Scopes};

/// How a statement list finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Value),
}

/// Reusable allocations for one render at a time.
#[derive(Debug, Default)]
pub struct RuntimeState {
    pub(crate) scopes: Scopes,
    /// Output captured by enclosing `try` bodies, innermost last.
    buffers: Vec<Vec<u8>>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything from a previous render.
    pub fn reset(&mut self, blocks: Option<BlockMap>) {
        self.scopes.reset(blocks);
        self.buffers.clear();
    }
}

/// Caller-supplied content for `yield content`.
struct ContentFrame {
    nodes: Arc<[Node]>,
    /// Scope the content was written in.
    scope: ScopeId,
    template: Arc<str>,
    /// Content that was active where the yield happened.
    outer: Option<Rc<ContentFrame>>,
}

/// Renders templates. Created by [`Set::execute`].
pub struct Runtime<'a> {
    set: &'a Set,
    state: &'a mut RuntimeState,
    out: &'a mut dyn Write,
    context: Value,
    content: Option<Rc<ContentFrame>>,
    /// Template whose nodes are executing, for error locations and
    /// relative includes.
    template: Arc<str>,
    depth: usize,
}

fn io_error(err: io::Error) -> RuntimeError {
    RuntimeError::new(RuntimeReason::Io, err.to_string())
}

/// Errors from loading an included template.
fn include_error(err: Error) -> RuntimeError {
    match err {
        Error::Runtime(err) => err,
        other => RuntimeError::new(RuntimeReason::Include, other.to_string()),
    }
}

fn error_type() -> &'static Arc<RecordType> {
    static ERROR_TYPE: OnceLock<Arc<RecordType>> = OnceLock::new();
    ERROR_TYPE.get_or_init(|| {
        RecordType::builder("Error")
            .field("Message")
            .field("Reason")
            .field("Template")
            .field("Line")
            .render(|record, rt| {
                let message = record.get("Message").cloned().unwrap_or_default();
                rt.write_value(&message)
            })
            .build()
    })
}

/// The value a `catch` binds.
pub fn error_value(err: &RuntimeError) -> Value {
    let line = err.line().map_or(Value::Null, |l| Value::Int(l as i64));
    Value::Record(
        Record::new(error_type())
            .with("Message", err.message.as_str())
            .with("Reason", err.reason.as_str())
            .with("Template", err.template.as_str())
            .with("Line", line),
    )
}

impl<'a> Runtime<'a> {
    pub(crate) fn new(
        set: &'a Set,
        state: &'a mut RuntimeState,
        out: &'a mut dyn Write,
        context: Value,
        template: Arc<str>,
    ) -> Self {
        Self {
            set,
            state,
            out,
            context,
            content: None,
            template,
            depth: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Host-facing API
    // ═══════════════════════════════════════════════════════════════════

    /// The current `.` value.
    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Name of the template being executed.
    pub fn template_name(&self) -> &str {
        &self.template
    }

    pub fn set(&self) -> &'a Set {
        self.set
    }

    /// Look up a variable: scopes, then set globals, then defaults.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        self.state
            .scopes
            .resolve(name)
            .cloned()
            .or_else(|| self.set.environment().lookup(name))
    }

    /// Bind a variable in the current scope.
    pub fn let_var(&mut self, name: impl Into<String>, value: Value) {
        self.state.scopes.let_var(name, value);
    }

    /// Assign to `name` if some scope binds it, otherwise bind it in the
    /// current scope.
    pub fn set_or_let(&mut self, name: &str, value: Value) {
        self.state.scopes.set_or_let(name, value);
    }

    /// Assign to an existing variable.
    pub fn set_var(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if self.state.scopes.set_var(name, value) {
            Ok(())
        } else {
            Err(RuntimeError::new(
                RuntimeReason::UndeclaredVariable,
                format!("variable \"{name}\" was not declared"),
            ))
        }
    }

    /// Write bytes as they are.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), RuntimeError> {
        self.sink().write_all(bytes).map_err(io_error)
    }

    /// Print a value the way an action would: render hook, or text through
    /// the escaper.
    pub fn write_value(&mut self, value: &Value) -> Result<(), RuntimeError> {
        if let Value::Record(record) = value {
            if let Some(hook) = record.record_type().render_hook().cloned() {
                return hook(record, self);
            }
        }
        let text = value.to_string();
        let set = self.set;
        match set.escaper() {
            Some(escape) => escape(self.sink(), text.as_bytes()).map_err(io_error),
            None => self.write(text.as_bytes()),
        }
    }

    /// Evaluate an expression in the current scope and context.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        self.eval_expr(expr)
            .map_err(|err| err.located(&self.template, expr.pos))
    }

    /// Run another template here and return its `return` value, nil if it
    /// has none. Relative names resolve against the current template.
    pub fn execute_template(
        &mut self,
        name: &str,
        context: Option<Value>,
    ) -> Result<Value, RuntimeError> {
        let template = self
            .set
            .get_sibling(&self.template, name)
            .map_err(include_error)?;
        match self.run_included(&template, context)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Null),
        }
    }

    /// Include a template if it exists. Returns whether it did.
    pub fn include_if_exists(
        &mut self,
        name: &str,
        context: Option<Value>,
    ) -> Result<bool, RuntimeError> {
        match self.set.get_sibling(&self.template, name) {
            Ok(template) => {
                self.run_included(&template, context)?;
                Ok(true)
            }
            Err(Error::NotFound(_)) => Ok(false),
            Err(err) => Err(include_error(err)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Plumbing
    // ═══════════════════════════════════════════════════════════════════

    fn sink(&mut self) -> &mut dyn Write {
        match self.state.buffers.last_mut() {
            Some(buffer) => buffer as &mut dyn Write,
            None => &mut *self.out,
        }
    }

    fn enter(&mut self) -> Result<(), RuntimeError> {
        let max = self.set.max_depth();
        if self.depth >= max {
            return Err(RuntimeError::new(
                RuntimeReason::RecursionLimit,
                format!("exceeded maximum template depth of {max}"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Run `f` in a fresh child scope, releasing it however `f` ends.
    fn with_scope<T>(
        &mut self,
        blocks: Option<BlockMap>,
        f: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        match blocks {
            Some(blocks) => self.state.scopes.new_scope_with_blocks(blocks),
            None => self.state.scopes.new_scope(),
        }
        let result = f(self);
        self.state.scopes.release_scope();
        result
    }

    fn lookup_identifier(&self, name: &str) -> Result<Value, RuntimeError> {
        self.resolve(name).ok_or_else(|| {
            RuntimeError::new(
                RuntimeReason::UndefinedVariable,
                format!("identifier \"{name}\" not available in current scope"),
            )
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════

    /// Execute nodes in order until one returns.
    pub(crate) fn exec_list(&mut self, nodes: &[Node]) -> Result<Flow, RuntimeError> {
        for node in nodes {
            if let Flow::Return(value) = self.exec_node(node)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_node(&mut self, node: &Node) -> Result<Flow, RuntimeError> {
        let result = match node {
            Node::Text(text) => self.write(text.text.as_bytes()).map(|_| Flow::Normal),
            Node::Action(action) => self.exec_action(action).map(|_| Flow::Normal),
            Node::If(node) => self.exec_if(node),
            Node::Range(node) => self.exec_range(node),
            Node::Try(node) => self.exec_try(node),
            Node::Block(block) => self.exec_block_declaration(block),
            Node::Yield(node) => self.exec_yield(node),
            Node::Include(node) => self.exec_include(node),
            Node::Return(node) => self.eval(&node.value).map(Flow::Return),
        };
        result.map_err(|err| err.located(&self.template, node.pos()))
    }

    fn exec_action(&mut self, action: &ActionNode) -> Result<(), RuntimeError> {
        match &action.body {
            ActionBody::Set(set) => self.exec_set(set),
            ActionBody::Pipeline(pipeline) => match self.exec_pipeline(pipeline)? {
                Some(value) => self.write_value(&value),
                None => Ok(()),
            },
        }
    }

    fn exec_set(&mut self, set: &SetNode) -> Result<(), RuntimeError> {
        if set.index_lookup {
            let (value, found) = self.eval_lookup(&set.values[0])?;
            self.assign(&set.targets[0], value, set.declaration)?;
            return self.assign(&set.targets[1], Value::Bool(found), set.declaration);
        }
        let values = set
            .values
            .iter()
            .map(|expr| self.eval(expr))
            .collect::<Result<Vec<_>, _>>()?;
        for (target, value) in set.targets.iter().zip(values) {
            self.assign(target, value, set.declaration)?;
        }
        Ok(())
    }

    /// `v, ok := m[k]`
    fn eval_lookup(&mut self, expr: &Expr) -> Result<(Value, bool), RuntimeError> {
        let ExprKind::Index { base, key, .. } = &expr.kind else {
            return Err(RuntimeError::new(
                RuntimeReason::Structural,
                format!("{expr} is not an index expression"),
            )
            .located(&self.template, expr.pos));
        };
        let base = self.eval(base)?;
        let key = self.eval(key)?;
        let found = lookup(&base, &key).map_err(|err| err.located(&self.template, expr.pos))?;
        let exists = found.is_some();
        Ok((found.unwrap_or_default(), exists))
    }

    fn assign(&mut self, target: &Expr, value: Value, declare: bool) -> Result<(), RuntimeError> {
        let result = match &target.kind {
            ExprKind::Underscore => Ok(()),
            ExprKind::Identifier(name) if declare => {
                self.state.scopes.let_var(name.clone(), value);
                Ok(())
            }
            ExprKind::Identifier(name) => self.set_var(name, value),
            ExprKind::Field(path) => {
                assign_path(self.context.clone(), path, value).map(|ctx| self.context = ctx)
            }
            ExprKind::Chain { base, path } => match &base.kind {
                ExprKind::Identifier(name) => self
                    .lookup_identifier(name)
                    .and_then(|current| assign_path(current, path, value))
                    .and_then(|updated| self.set_var(name, updated)),
                _ => Err(cannot_assign(target)),
            },
            _ => Err(cannot_assign(target)),
        };
        result.map_err(|err| err.located(&self.template, target.pos))
    }

    fn exec_pipeline(&mut self, pipeline: &PipelineNode) -> Result<Option<Value>, RuntimeError> {
        let last = pipeline.commands.len().saturating_sub(1);
        let mut piped = None;
        for (i, command) in pipeline.commands.iter().enumerate() {
            match self.exec_command(command, piped.take(), i == last)? {
                Some(value) => piped = Some(value),
                None => return Ok(None),
            }
        }
        Ok(piped)
    }

    /// Run one pipeline command. `None` means a safe writer consumed the
    /// output.
    fn exec_command(
        &mut self,
        command: &CommandNode,
        piped: Option<Value>,
        terminal: bool,
    ) -> Result<Option<Value>, RuntimeError> {
        let no_args: &[Expr] = &[];
        let (callee, args) = match (&command.args, &command.expr.kind) {
            (Some(args), _) => (&command.expr, args.as_slice()),
            (None, ExprKind::Call { callee, args }) => (callee.as_ref(), args.as_slice()),
            (None, _) if piped.is_some() => (&command.expr, no_args),
            (None, _) => return self.eval(&command.expr).map(Some),
        };
        let func = callable(self.eval(callee)?, callee)
            .map_err(|err| err.located(&self.template, callee.pos))?;
        let slots = slots(args, piped);

        let result = match func.kind() {
            FuncKind::Writer(writer) => {
                if !terminal {
                    return Err(RuntimeError::new(
                        RuntimeReason::Structural,
                        format!(
                            "safe writer {} can only be used as the last command of a pipeline",
                            func.name()
                        ),
                    )
                    .located(&self.template, command.pos));
                }
                let writer = writer.clone();
                for slot in slots {
                    let text = self.slot_value(slot)?.to_string();
                    writer(self.sink(), text.as_bytes()).map_err(io_error)?;
                }
                Ok(None)
            }
            _ => self.call_func(&func, slots).map(Some),
        };
        result.map_err(|err| err.located(&self.template, command.pos))
    }

    fn exec_if(&mut self, node: &IfNode) -> Result<Flow, RuntimeError> {
        self.with_scope(None, |rt| {
            if let Some(set) = &node.set {
                rt.exec_set(set)?;
            }
            if rt.eval(&node.condition)?.is_truthy() {
                rt.exec_list(&node.body)
            } else if let Some(else_body) = &node.else_body {
                rt.exec_list(else_body)
            } else {
                Ok(Flow::Normal)
            }
        })
    }

    fn exec_range(&mut self, node: &RangeNode) -> Result<Flow, RuntimeError> {
        let collection = self.eval(&node.collection)?;
        let mut ranger = ranger_for(&collection)?;
        let (targets, declare) = match &node.set {
            Some(set) => (set.targets.as_slice(), set.declaration),
            None => (&[][..], false),
        };
        if targets.len() == 2 && !ranger.provides_index() {
            return Err(RuntimeError::new(
                RuntimeReason::Structural,
                format!(
                    "range over {} does not provide an index",
                    collection.type_name()
                ),
            ));
        }

        let saved_context = self.context.clone();
        let result = self.with_scope(None, |rt| {
            rt.range_loop(node, ranger.as_mut(), targets, declare)
        });
        self.context = saved_context;
        ranger.done();
        result
    }

    fn range_loop(
        &mut self,
        node: &RangeNode,
        ranger: &mut dyn Ranger,
        targets: &[Expr],
        declare: bool,
    ) -> Result<Flow, RuntimeError> {
        let mut first = true;
        while let Some((index, value)) = ranger.range() {
            first = false;
            match targets {
                [] => self.context = value,
                [target] => {
                    self.context = value.clone();
                    self.assign(target, value, declare)?;
                }
                [key_target, value_target] => {
                    self.assign(key_target, index, declare)?;
                    self.assign(value_target, value, declare)?;
                }
                _ => {
                    return Err(RuntimeError::new(
                        RuntimeReason::Structural,
                        "range permits at most two variables",
                    ))
                }
            }
            // A nil return only ends the current iteration.
            match self.exec_list(&node.body)? {
                Flow::Return(value) if !value.is_null() => return Ok(Flow::Return(value)),
                _ => {}
            }
        }
        match &node.else_body {
            Some(else_body) if first => self.exec_list(else_body),
            _ => Ok(Flow::Normal),
        }
    }

    fn exec_try(&mut self, node: &TryNode) -> Result<Flow, RuntimeError> {
        self.state.buffers.push(Vec::new());
        let result = self.exec_list(&node.body);
        let buffer = self.state.buffers.pop().unwrap_or_default();

        let err = match result {
            Ok(flow) => {
                self.write(&buffer)?;
                return Ok(flow);
            }
            Err(err) if !err.is_catchable() => return Err(err),
            Err(err) => err,
        };
        tracing::debug!(template = %self.template, error = %err, "try caught error");

        let Some(catch) = &node.catch else {
            return Ok(Flow::Normal);
        };
        self.with_scope(None, |rt| {
            if let Some(name) = &catch.binding {
                rt.state.scopes.let_var(name.clone(), error_value(&err));
            }
            rt.exec_list(&catch.body)
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Blocks, yield and include
    // ═══════════════════════════════════════════════════════════════════

    /// A block runs where it is declared, unless an override replaces it.
    fn exec_block_declaration(&mut self, declared: &Arc<BlockNode>) -> Result<Flow, RuntimeError> {
        let block = self
            .state
            .scopes
            .lookup_block(&declared.name)
            .unwrap_or_else(|| declared.clone());
        let mut args = Vec::new();
        for param in &declared.params {
            if let Some(default) = &param.default {
                args.push((param.name.clone(), self.eval(default)?));
            }
        }
        let context = match &declared.context {
            Some(expr) => Some(self.eval(expr)?),
            None => None,
        };
        self.exec_block(&block, args, context, declared.content.clone())
    }

    fn exec_yield(&mut self, node: &YieldNode) -> Result<Flow, RuntimeError> {
        let context = match &node.context {
            Some(expr) => Some(self.eval(expr)?),
            None => None,
        };
        let Some(name) = &node.name else {
            return self.yield_content(context);
        };

        let block = self.state.scopes.lookup_block(name).ok_or_else(|| {
            RuntimeError::new(
                RuntimeReason::UndefinedBlock,
                format!("unresolved block \"{name}\""),
            )
        })?;
        let mut args = Vec::with_capacity(node.args.len());
        for (i, arg) in node.args.iter().enumerate() {
            let param = match &arg.name {
                Some(name) => name.clone(),
                None => match block.params.get(i) {
                    Some(param) => param.name.clone(),
                    None => {
                        return Err(RuntimeError::new(
                            RuntimeReason::InvalidArgumentCount,
                            format!(
                                "block {name} takes {} parameters, got {}",
                                block.params.len(),
                                node.args.len()
                            ),
                        ))
                    }
                },
            };
            args.push((param, self.eval(&arg.value)?));
        }
        self.exec_block(&block, args, context, node.content.clone())
    }

    /// Execute a block body with bound parameters, an optional new context,
    /// and optional content for `yield content`.
    fn exec_block(
        &mut self,
        block: &Arc<BlockNode>,
        args: Vec<(String, Value)>,
        context: Option<Value>,
        content: Option<Arc<[Node]>>,
    ) -> Result<Flow, RuntimeError> {
        self.enter()?;
        let needs_scope = !block.params.is_empty() || !args.is_empty();
        let result = if needs_scope {
            self.with_scope(None, |rt| {
                for (name, value) in args {
                    rt.state.scopes.let_var(name, value);
                }
                for param in &block.params {
                    if rt.state.scopes.is_local(&param.name) {
                        continue;
                    }
                    let value = match &param.default {
                        Some(default) => rt.eval(default)?,
                        None => Value::Bool(false),
                    };
                    rt.state.scopes.let_var(param.name.clone(), value);
                }
                rt.run_block(block, context, content)
            })
        } else {
            self.run_block(block, context, content)
        };
        self.leave();
        // A return inside a block only ends the block.
        result.map(|_| Flow::Normal)
    }

    fn run_block(
        &mut self,
        block: &BlockNode,
        context: Option<Value>,
        content: Option<Arc<[Node]>>,
    ) -> Result<Flow, RuntimeError> {
        let outer_content = self.content.clone();
        if let Some(nodes) = content {
            self.content = Some(Rc::new(ContentFrame {
                nodes,
                scope: self.state.scopes.current(),
                template: self.template.clone(),
                outer: outer_content.clone(),
            }));
        }
        let saved_context = context.map(|c| mem::replace(&mut self.context, c));
        let saved_template = mem::replace(&mut self.template, block.template.clone());

        let result = self.exec_list(&block.body);

        self.template = saved_template;
        if let Some(c) = saved_context {
            self.context = c;
        }
        self.content = outer_content;
        result
    }

    /// Run the content handed to the enclosing block, in the scope it was
    /// written in. Nothing happens without content.
    fn yield_content(&mut self, context: Option<Value>) -> Result<Flow, RuntimeError> {
        let Some(frame) = self.content.clone() else {
            return Ok(Flow::Normal);
        };
        self.enter()?;
        let saved_scope = self.state.scopes.current();
        self.state.scopes.set_current(frame.scope);
        let saved_content = mem::replace(&mut self.content, frame.outer.clone());
        let saved_template = mem::replace(&mut self.template, frame.template.clone());
        let saved_context = context.map(|c| mem::replace(&mut self.context, c));

        let result = self.exec_list(&frame.nodes);

        if let Some(c) = saved_context {
            self.context = c;
        }
        self.template = saved_template;
        self.content = saved_content;
        self.state.scopes.set_current(saved_scope);
        self.leave();
        result.map(|_| Flow::Normal)
    }

    fn exec_include(&mut self, node: &IncludeNode) -> Result<Flow, RuntimeError> {
        let name = self.eval(&node.name)?;
        let Some(name) = name.as_text() else {
            return Err(RuntimeError::new(
                RuntimeReason::InvalidValue,
                format!(
                    "include: template name must be a string, got {}",
                    name.type_name()
                ),
            ));
        };
        let context = match &node.context {
            Some(expr) => Some(self.eval(expr)?),
            None => None,
        };
        let template = self
            .set
            .get_sibling(&node.template, &name)
            .map_err(include_error)?;
        tracing::debug!(from = %node.template, include = %template.name(), "include");
        self.run_included(&template, context)
    }

    /// Execute `template` from the top of its `extends` chain, with its
    /// blocks in scope. The includer's content is not visible to it.
    fn run_included(
        &mut self,
        template: &Arc<Template>,
        context: Option<Value>,
    ) -> Result<Flow, RuntimeError> {
        self.enter()?;
        let root = template.root_template();
        let saved_template = mem::replace(&mut self.template, root.name_arc());
        let saved_context = context.map(|c| mem::replace(&mut self.context, c));
        let saved_content = self.content.take();

        let result = self.with_scope(Some(template.blocks().clone()), |rt| {
            rt.exec_list(root.root())
        });

        if let Some(c) = saved_context {
            self.context = c;
        }
        self.content = saved_content;
        self.template = saved_template;
        self.leave();
        result
    }

    // ═══════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Identifier(name) => self.lookup_identifier(name),
            ExprKind::Field(path) => resolve_path(self.context.clone(), path),
            ExprKind::Chain { base, path } => {
                let base = self.eval(base)?;
                resolve_path(base, path)
            }
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Number(n) => Ok(match n.value {
                NumberValue::Int(i) => Value::Int(i),
                NumberValue::Uint(u) => Value::Uint(u),
                NumberValue::Float(f) => Value::Float(f),
            }),
            ExprKind::Nil => Ok(Value::Null),
            ExprKind::Index {
                base,
                key,
                nullable,
            } => {
                let base = self.eval(base)?;
                let key = self.eval(key)?;
                resolve_index(&base, &key, *nullable)
            }
            ExprKind::Slice { base, start, end } => {
                let base = self.eval(base)?;
                let start = match start {
                    Some(e) => Some(self.eval(e)?),
                    None => None,
                };
                let end = match end {
                    Some(e) => Some(self.eval(e)?),
                    None => None,
                };
                slice(&base, start.as_ref(), end.as_ref())
            }
            ExprKind::Call { callee, args } => {
                let func = callable(self.eval(callee)?, callee)?;
                let slots = args.iter().map(Slot::Expr).collect();
                self.call_func(&func, slots)
            }
            ExprKind::Additive {
                left: None,
                op,
                right,
            } => {
                let operand = self.eval(right)?;
                ops::unary(*op, &operand)
            }
            ExprKind::Additive {
                left: Some(left),
                op,
                right,
            } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                ops::additive(*op, &l, &r)
            }
            ExprKind::Multiplicative { left, op, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                ops::multiplicative(*op, &l, &r)
            }
            ExprKind::Comparative { left, op, right } => {
                let equal = self.eval(left)? == self.eval(right)?;
                Ok(Value::Bool(match op {
                    ComparativeOp::Eq => equal,
                    ComparativeOp::Ne => !equal,
                }))
            }
            ExprKind::NumericComparative { left, op, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                ops::compare(*op, &l, &r).map(Value::Bool)
            }
            ExprKind::Logical { left, op, right } => {
                let l = self.eval(left)?.is_truthy();
                let result = match op {
                    LogicalOp::And => l && self.eval(right)?.is_truthy(),
                    LogicalOp::Or => l || self.eval(right)?.is_truthy(),
                };
                Ok(Value::Bool(result))
            }
            ExprKind::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.is_truthy())),
            ExprKind::Ternary {
                condition,
                left,
                right,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(left)
                } else {
                    self.eval(right)
                }
            }
            ExprKind::Underscore => Err(RuntimeError::new(
                RuntimeReason::InvalidOperation,
                "_ can only be used as a pipeline argument",
            )),
        }
    }
}

fn cannot_assign(target: &Expr) -> RuntimeError {
    RuntimeError::new(
        RuntimeReason::InvalidOperation,
        format!("cannot assign to {target}"),
    )
}
