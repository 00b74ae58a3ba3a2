//! Identifier collection over a parsed tree.

use std::collections::BTreeSet;

use super::types::*;

/// Identifiers a template reads without declaring them itself.
///
/// Names bound anywhere in the tree by `:=`, a range, a catch or a block
/// parameter are left out, so the result approximates what the caller has
/// to provide.
pub fn free_identifiers(nodes: &[Node]) -> BTreeSet<String> {
    let mut walk = Walk::default();
    walk.nodes(nodes);
    walk.used.retain(|name| !walk.bound.contains(name));
    walk.used
}

#[derive(Default)]
struct Walk {
    used: BTreeSet<String>,
    bound: BTreeSet<String>,
}

impl Walk {
    fn nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.node(node);
        }
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Text(_) => {}
            Node::Action(action) => match &action.body {
                ActionBody::Set(set) => self.set(set),
                ActionBody::Pipeline(pipeline) => self.pipeline(pipeline),
            },
            Node::If(node) => {
                if let Some(set) = &node.set {
                    self.set(set);
                }
                self.expr(&node.condition);
                self.nodes(&node.body);
                if let Some(else_body) = &node.else_body {
                    self.nodes(else_body);
                }
            }
            Node::Range(node) => {
                if let Some(set) = &node.set {
                    self.set(set);
                }
                self.expr(&node.collection);
                self.nodes(&node.body);
                if let Some(else_body) = &node.else_body {
                    self.nodes(else_body);
                }
            }
            Node::Try(node) => {
                self.nodes(&node.body);
                if let Some(catch) = &node.catch {
                    if let Some(binding) = &catch.binding {
                        self.bound.insert(binding.clone());
                    }
                    self.nodes(&catch.body);
                }
            }
            Node::Block(block) => {
                for param in &block.params {
                    self.bound.insert(param.name.clone());
                    if let Some(default) = &param.default {
                        self.expr(default);
                    }
                }
                if let Some(context) = &block.context {
                    self.expr(context);
                }
                self.nodes(&block.body);
                if let Some(content) = &block.content {
                    self.nodes(content);
                }
            }
            Node::Yield(node) => {
                for arg in &node.args {
                    self.expr(&arg.value);
                }
                if let Some(context) = &node.context {
                    self.expr(context);
                }
                if let Some(content) = &node.content {
                    self.nodes(content);
                }
            }
            Node::Include(node) => {
                self.expr(&node.name);
                if let Some(context) = &node.context {
                    self.expr(context);
                }
            }
            Node::Return(node) => self.expr(&node.value),
        }
    }

    fn set(&mut self, set: &SetNode) {
        for target in &set.targets {
            match &target.kind {
                ExprKind::Identifier(name) if set.declaration => {
                    self.bound.insert(name.clone());
                }
                _ => self.expr(target),
            }
        }
        for value in &set.values {
            self.expr(value);
        }
    }

    fn pipeline(&mut self, pipeline: &PipelineNode) {
        for command in &pipeline.commands {
            self.expr(&command.expr);
            for arg in command.args.iter().flatten() {
                self.expr(arg);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                self.used.insert(name.clone());
            }
            ExprKind::Chain { base, .. } => self.expr(base),
            ExprKind::Index { base, key, .. } => {
                self.expr(base);
                self.expr(key);
            }
            ExprKind::Slice { base, start, end } => {
                self.expr(base);
                for bound in start.iter().chain(end.iter()) {
                    self.expr(bound);
                }
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee);
                for arg in args {
                    self.expr(arg);
                }
            }
            ExprKind::Additive { left, right, .. } => {
                if let Some(left) = left {
                    self.expr(left);
                }
                self.expr(right);
            }
            ExprKind::Multiplicative { left, right, .. }
            | ExprKind::Comparative { left, right, .. }
            | ExprKind::NumericComparative { left, right, .. }
            | ExprKind::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Not(inner) => self.expr(inner),
            ExprKind::Ternary {
                condition,
                left,
                right,
            } => {
                self.expr(condition);
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Field(_)
            | ExprKind::Bool(_)
            | ExprKind::String(_)
            | ExprKind::Number(_)
            | ExprKind::Nil
            | ExprKind::Underscore => {}
        }
    }
}
