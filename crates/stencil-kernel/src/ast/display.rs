//! Source rendering for AST nodes.
//!
//! The output always uses the default delimiters and re-parses to the same
//! tree. Parentheses are only emitted where precedence requires them.

use std::fmt;

use super::types::*;
use crate::lexer::quote;

const L: &str = crate::lexer::DEFAULT_LEFT_DELIM;
const R: &str = crate::lexer::DEFAULT_RIGHT_DELIM;

/// Binding strength of an expression; operands bind tightest.
fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Ternary { .. } => 1,
        ExprKind::Logical { .. } => 2,
        ExprKind::Comparative { .. } => 3,
        ExprKind::NumericComparative { .. } => 4,
        ExprKind::Additive { left: Some(_), .. } => 5,
        ExprKind::Multiplicative { .. } => 6,
        ExprKind::Not(_) | ExprKind::Additive { left: None, .. } => 7,
        _ => 8,
    }
}

/// Write `expr`, parenthesised when it binds looser than `min`.
fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
    if precedence(expr) < min {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

fn write_binary(
    f: &mut fmt::Formatter<'_>,
    parent: &Expr,
    left: &Expr,
    op: &str,
    right: &Expr,
) -> fmt::Result {
    let prec = precedence(parent);
    write_operand(f, left, prec)?;
    write!(f, " {op} ")?;
    write_operand(f, right, prec + 1)
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_body(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for node in nodes {
        write!(f, "{node}")?;
    }
    Ok(())
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &[FieldSegment]) -> fmt::Result {
    for segment in path {
        write!(f, "{segment}")?;
    }
    Ok(())
}

impl fmt::Display for FieldSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lax {
            write!(f, "?.{}", self.name)
        } else {
            write!(f, ".{}", self.name)
        }
    }
}

impl fmt::Display for AdditiveOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdditiveOp::Add => "+",
            AdditiveOp::Sub => "-",
        })
    }
}

impl fmt::Display for MultiplicativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MultiplicativeOp::Mul => "*",
            MultiplicativeOp::Div => "/",
            MultiplicativeOp::Mod => "%",
        })
    }
}

impl fmt::Display for ComparativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComparativeOp::Eq => "==",
            ComparativeOp::Ne => "!=",
        })
    }
}

impl fmt::Display for NumericComparativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NumericComparativeOp::Gt => ">",
            NumericComparativeOp::Ge => ">=",
            NumericComparativeOp::Lt => "<",
            NumericComparativeOp::Le => "<=",
        })
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Identifier(name) => f.write_str(name),
            ExprKind::Field(path) if path.is_empty() => f.write_str("."),
            ExprKind::Field(path) => write_path(f, path),
            ExprKind::Chain { base, path } => {
                // `.A.B` would read back as one field.
                if matches!(base.kind, ExprKind::Field(_)) {
                    write!(f, "({base})")?;
                } else {
                    write_operand(f, base, 8)?;
                }
                write_path(f, path)
            }
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::String(s) => f.write_str(&quote(s)),
            ExprKind::Number(n) => f.write_str(&n.text),
            ExprKind::Nil => f.write_str("nil"),
            ExprKind::Index {
                base,
                key,
                nullable,
            } => {
                write_operand(f, base, 8)?;
                f.write_str(if *nullable { "?[" } else { "[" })?;
                write!(f, "{key}]")
            }
            ExprKind::Slice { base, start, end } => {
                write_operand(f, base, 8)?;
                f.write_str("[")?;
                if let Some(start) = start {
                    write!(f, "{start}")?;
                }
                f.write_str(":")?;
                if let Some(end) = end {
                    write!(f, "{end}")?;
                }
                f.write_str("]")
            }
            ExprKind::Call { callee, args } => {
                write_operand(f, callee, 8)?;
                f.write_str("(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            ExprKind::Additive {
                left: None,
                op,
                right,
            } => {
                write!(f, "{op}")?;
                write_operand(f, right, 8)
            }
            ExprKind::Additive {
                left: Some(left),
                op,
                right,
            } => write_binary(f, self, left, &op.to_string(), right),
            ExprKind::Multiplicative { left, op, right } => {
                write_binary(f, self, left, &op.to_string(), right)
            }
            ExprKind::Comparative { left, op, right } => {
                write_binary(f, self, left, &op.to_string(), right)
            }
            ExprKind::NumericComparative { left, op, right } => {
                write_binary(f, self, left, &op.to_string(), right)
            }
            ExprKind::Logical { left, op, right } => {
                write_binary(f, self, left, &op.to_string(), right)
            }
            ExprKind::Not(inner) => {
                f.write_str("!")?;
                write_operand(f, inner, 8)
            }
            ExprKind::Ternary {
                condition,
                left,
                right,
            } => {
                write_operand(f, condition, 2)?;
                write!(f, " ? {left} : {right}")
            }
            ExprKind::Underscore => f.write_str("_"),
        }
    }
}

impl fmt::Display for SetNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_list(f, &self.targets)?;
        f.write_str(if self.declaration { " := " } else { " = " })?;
        write_list(f, &self.values)
    }
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(args) = &self.args {
            f.write_str(": ")?;
            write_list(f, args)?;
        }
        Ok(())
    }
}

impl fmt::Display for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{command}")?;
        }
        Ok(())
    }
}

impl fmt::Display for BlockParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.default {
            Some(default) => write!(f, "{}={}", self.name, default),
            None => f.write_str(&self.name),
        }
    }
}

impl fmt::Display for YieldArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}={}", name, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

fn write_context(f: &mut fmt::Formatter<'_>, context: &Option<Expr>) -> fmt::Result {
    if let Some(context) = context {
        f.write_str(" ")?;
        write_operand(f, context, 8)?;
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(text) => f.write_str(&text.text),
            Node::Action(action) => match &action.body {
                ActionBody::Set(set) => write!(f, "{L} {set} {R}"),
                ActionBody::Pipeline(pipe) => write!(f, "{L} {pipe} {R}"),
            },
            Node::If(node) => {
                write!(f, "{L} if ")?;
                if let Some(set) = &node.set {
                    write!(f, "{set}; ")?;
                }
                write!(f, "{} {R}", node.condition)?;
                write_body(f, &node.body)?;
                if let Some(else_body) = &node.else_body {
                    write!(f, "{L} else {R}")?;
                    write_body(f, else_body)?;
                }
                write!(f, "{L} end {R}")
            }
            Node::Range(node) => {
                write!(f, "{L} range ")?;
                if let Some(set) = &node.set {
                    write_list(f, &set.targets)?;
                    f.write_str(if set.declaration { " := " } else { " = " })?;
                }
                write!(f, "{} {R}", node.collection)?;
                write_body(f, &node.body)?;
                if let Some(else_body) = &node.else_body {
                    write!(f, "{L} else {R}")?;
                    write_body(f, else_body)?;
                }
                write!(f, "{L} end {R}")
            }
            Node::Try(node) => {
                write!(f, "{L} try {R}")?;
                write_body(f, &node.body)?;
                if let Some(catch) = &node.catch {
                    match &catch.binding {
                        Some(name) => write!(f, "{L} catch {name} {R}")?,
                        None => write!(f, "{L} catch {R}")?,
                    }
                    write_body(f, &catch.body)?;
                }
                write!(f, "{L} end {R}")
            }
            Node::Block(block) => {
                write!(f, "{L} block {}(", block.name)?;
                write_list(f, &block.params)?;
                f.write_str(")")?;
                write_context(f, &block.context)?;
                write!(f, " {R}")?;
                write_body(f, &block.body)?;
                if let Some(content) = &block.content {
                    write!(f, "{L} content {R}")?;
                    write_body(f, content)?;
                }
                write!(f, "{L} end {R}")
            }
            Node::Yield(node) => {
                write!(f, "{L} yield ")?;
                match &node.name {
                    Some(name) => {
                        write!(f, "{name}(")?;
                        write_list(f, &node.args)?;
                        f.write_str(")")?;
                    }
                    None => f.write_str("content")?,
                }
                write_context(f, &node.context)?;
                match &node.content {
                    Some(content) => {
                        write!(f, " content {R}")?;
                        write_body(f, content)?;
                        write!(f, "{L} end {R}")
                    }
                    None => write!(f, " {R}"),
                }
            }
            Node::Include(node) => {
                write!(f, "{L} include {}", node.name)?;
                write_context(f, &node.context)?;
                write!(f, " {R}")
            }
            Node::Return(node) => write!(f, "{L} return {} {R}", node.value),
        }
    }
}
