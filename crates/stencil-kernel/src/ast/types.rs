//! AST type definitions.
//!
//! Statements ([`Node`]) form the body of a template; expressions ([`Expr`])
//! appear inside actions. Every node carries the [`Pos`] it was parsed at.

use std::sync::Arc;

pub use crate::lexer::Pos;

/// A statement in a template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text between actions.
    Text(TextNode),
    /// `{{ pipeline }}` or `{{ x := value }}`
    Action(ActionNode),
    /// `{{ if cond }} ... {{ else }} ... {{ end }}`
    If(IfNode),
    /// `{{ range k, v := coll }} ... {{ end }}`
    Range(RangeNode),
    /// `{{ try }} ... {{ catch err }} ... {{ end }}`
    Try(TryNode),
    /// `{{ block name(params) ctx }} ... {{ end }}`, also recorded in the
    /// template's block map.
    Block(Arc<BlockNode>),
    /// `{{ yield name(args) ctx }}` or `{{ yield content }}`
    Yield(YieldNode),
    /// `{{ include "path" ctx }}`
    Include(IncludeNode),
    /// `{{ return value }}`
    Return(ReturnNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub pos: Pos,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionBody {
    Set(SetNode),
    Pipeline(PipelineNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub pos: Pos,
    pub body: ActionBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub pos: Pos,
    /// Optional `x := value;` prefix, evaluated before the condition.
    pub set: Option<SetNode>,
    pub condition: Expr,
    pub body: Vec<Node>,
    pub else_body: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeNode {
    pub pos: Pos,
    /// Loop variables. `values` is always empty; the collection lives in
    /// `collection`.
    pub set: Option<SetNode>,
    pub collection: Expr,
    pub body: Vec<Node>,
    pub else_body: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryNode {
    pub pos: Pos,
    pub body: Vec<Node>,
    pub catch: Option<CatchNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchNode {
    pub pos: Pos,
    /// Name the error is bound to inside the catch body.
    pub binding: Option<String>,
    pub body: Vec<Node>,
}

/// A block parameter with an optional default value.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockParam {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub pos: Pos,
    /// Template the block was declared in.
    pub template: Arc<str>,
    pub name: String,
    pub params: Vec<BlockParam>,
    pub context: Option<Expr>,
    pub body: Vec<Node>,
    /// Default content, rendered by `{{ yield content }}` when the block is
    /// executed at its declaration site.
    pub content: Option<Arc<[Node]>>,
}

/// A `yield` argument: `name=value` or positional.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldArg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YieldNode {
    pub pos: Pos,
    pub template: Arc<str>,
    /// Block to execute; `None` means `yield content`.
    pub name: Option<String>,
    pub args: Vec<YieldArg>,
    pub context: Option<Expr>,
    /// Inline content handed to the block, closing with `{{ end }}`.
    pub content: Option<Arc<[Node]>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncludeNode {
    pub pos: Pos,
    /// Template the include appears in; relative paths resolve against it.
    pub template: Arc<str>,
    pub name: Expr,
    pub context: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnNode {
    pub pos: Pos,
    pub value: Expr,
}

/// Assignment: `a, b = x, y`, `a := x`, or the lookup form `v, ok := m[k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetNode {
    pub pos: Pos,
    pub targets: Vec<Expr>,
    pub values: Vec<Expr>,
    /// `:=` rather than `=`.
    pub declaration: bool,
    /// Two targets, one `Index` value: binds the element and whether it exists.
    pub index_lookup: bool,
}

/// `cmd | cmd | ...`
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    pub pos: Pos,
    pub commands: Vec<CommandNode>,
}

/// One pipeline stage: an expression, optionally called with `: a, b`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandNode {
    pub pos: Pos,
    pub expr: Expr,
    pub args: Option<Vec<Expr>>,
}

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSegment {
    pub name: String,
    /// `?.Name`: a missing value yields nil instead of an error.
    pub lax: bool,
}

impl FieldSegment {
    pub fn new(name: impl Into<String>, lax: bool) -> Self {
        Self {
            name: name.into(),
            lax,
        }
    }
}

/// An expression with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub pos: Pos,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(pos: Pos, kind: ExprKind) -> Self {
        Self { pos, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Identifier(String),
    /// Access on the context value: `.`, `.User.Name`, `?.Maybe`
    Field(Vec<FieldSegment>),
    /// Field access on a computed value: `user.Name`, `f().X`
    Chain {
        base: Box<Expr>,
        path: Vec<FieldSegment>,
    },
    Bool(bool),
    String(String),
    Number(Number),
    Nil,
    Index {
        base: Box<Expr>,
        key: Box<Expr>,
        /// `?[`
        nullable: bool,
    },
    Slice {
        base: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `a + b`, `a - b`; unary `-x` has no left operand.
    Additive {
        left: Option<Box<Expr>>,
        op: AdditiveOp,
        right: Box<Expr>,
    },
    Multiplicative {
        left: Box<Expr>,
        op: MultiplicativeOp,
        right: Box<Expr>,
    },
    Comparative {
        left: Box<Expr>,
        op: ComparativeOp,
        right: Box<Expr>,
    },
    NumericComparative {
        left: Box<Expr>,
        op: NumericComparativeOp,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Ternary {
        condition: Box<Expr>,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `_`, the pipeline placeholder.
    Underscore,
}

/// A numeric literal, keeping its source spelling.
#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    pub text: String,
    pub value: NumberValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    Int(i64),
    Uint(u64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditiveOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplicativeOp {
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparativeOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericComparativeOp {
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// The kind of a node, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Text,
    Action,
    If,
    Range,
    Try,
    Block,
    Yield,
    Include,
    Return,
    Set,
    Pipeline,
    Command,
    Identifier,
    Field,
    Chain,
    Bool,
    String,
    Number,
    Nil,
    Index,
    Slice,
    Call,
    Additive,
    Multiplicative,
    Comparative,
    NumericComparative,
    Logical,
    Not,
    Ternary,
    Underscore,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Text(_) => NodeType::Text,
            Node::Action(_) => NodeType::Action,
            Node::If(_) => NodeType::If,
            Node::Range(_) => NodeType::Range,
            Node::Try(_) => NodeType::Try,
            Node::Block(_) => NodeType::Block,
            Node::Yield(_) => NodeType::Yield,
            Node::Include(_) => NodeType::Include,
            Node::Return(_) => NodeType::Return,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            Node::Text(n) => n.pos,
            Node::Action(n) => n.pos,
            Node::If(n) => n.pos,
            Node::Range(n) => n.pos,
            Node::Try(n) => n.pos,
            Node::Block(n) => n.pos,
            Node::Yield(n) => n.pos,
            Node::Include(n) => n.pos,
            Node::Return(n) => n.pos,
        }
    }

    pub fn line(&self) -> usize {
        self.pos().line
    }
}

impl Expr {
    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            ExprKind::Identifier(_) => NodeType::Identifier,
            ExprKind::Field(_) => NodeType::Field,
            ExprKind::Chain { .. } => NodeType::Chain,
            ExprKind::Bool(_) => NodeType::Bool,
            ExprKind::String(_) => NodeType::String,
            ExprKind::Number(_) => NodeType::Number,
            ExprKind::Nil => NodeType::Nil,
            ExprKind::Index { .. } => NodeType::Index,
            ExprKind::Slice { .. } => NodeType::Slice,
            ExprKind::Call { .. } => NodeType::Call,
            ExprKind::Additive { .. } => NodeType::Additive,
            ExprKind::Multiplicative { .. } => NodeType::Multiplicative,
            ExprKind::Comparative { .. } => NodeType::Comparative,
            ExprKind::NumericComparative { .. } => NodeType::NumericComparative,
            ExprKind::Logical { .. } => NodeType::Logical,
            ExprKind::Not(_) => NodeType::Not,
            ExprKind::Ternary { .. } => NodeType::Ternary,
            ExprKind::Underscore => NodeType::Underscore,
        }
    }

    pub fn line(&self) -> usize {
        self.pos.line
    }

    /// Identifiers, fields, chains and `_` can appear left of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier(_)
                | ExprKind::Field(_)
                | ExprKind::Chain { .. }
                | ExprKind::Underscore
        )
    }
}
