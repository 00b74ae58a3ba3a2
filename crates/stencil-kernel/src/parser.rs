//! Parser for stencil templates.
//!
//! A hand-written recursive descent parser over the lexer's token stream.
//! It keeps a pushback buffer of up to three tokens, which is what the
//! leading `extends`/`import` clauses and `else if` need to look ahead.
//!
//! Expression precedence, loosest first:
//!
//! 1. ternary `c ? a : b`
//! 2. logical `&&`, `||`, `and`, `or`
//! 3. `==`, `!=`
//! 4. `>`, `>=`, `<`, `<=`
//! 5. `+`, `-`
//! 6. `*`, `/`, `%`
//! 7. unary `!`, `not`, `-x`, `+x`
//! 8. operands with field, call, index and slice suffixes
//!
//! The parser only reads one template. Resolving `extends` and `import`
//! references is left to the [`Set`](crate::Set).

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::*;
use crate::error::{ParseError, ParseReason};
use crate::lexer::{self, Delims, Lexer, NumberLit, Token, TokenKind};

/// Maximum nesting depth for expressions and parentheses.
/// Prevents stack overflow from pathologically nested inputs like `((((...`
const MAX_NESTING: usize = 256;

/// An `extends` or `import` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Path as written in the template.
    pub path: String,
    pub pos: Pos,
}

/// The result of parsing one template source.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTemplate {
    pub name: String,
    pub extends: Option<Reference>,
    pub imports: Vec<Reference>,
    pub root: Vec<Node>,
    /// Blocks declared anywhere in this source. Later declarations win.
    pub blocks: HashMap<String, Arc<BlockNode>>,
}

/// Parse a single template source.
pub fn parse(name: &str, source: &str, delims: &Delims) -> Result<ParsedTemplate, ParseError> {
    let mut parser = Parser::new(name, source, delims);
    parser.parse_template()
}

/// Parse a template with the default delimiters.
pub fn parse_default(name: &str, source: &str) -> Result<ParsedTemplate, ParseError> {
    parse(name, source, &Delims::default())
}

/// What ended an item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Eof,
    End,
    Else,
    ElseIf,
    Content,
    Catch,
}

impl Terminator {
    fn describe(self) -> &'static str {
        match self {
            Terminator::Eof => "EOF",
            Terminator::End => "{{end}}",
            Terminator::Else => "{{else}}",
            Terminator::ElseIf => "{{else if}}",
            Terminator::Content => "{{content}}",
            Terminator::Catch => "{{catch}}",
        }
    }
}

struct EndItem {
    kind: Terminator,
    pos: Pos,
    /// Error binding of `{{ catch err }}`.
    binding: Option<String>,
}

enum Item {
    Node(Node),
    End(EndItem),
}

enum Assigned {
    Set(SetNode),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Action,
    If,
    Range,
    Block,
    Yield,
    Include,
    Return,
}

impl Context {
    fn as_str(self) -> &'static str {
        match self {
            Context::Action => "command",
            Context::If => "if",
            Context::Range => "range",
            Context::Block => "block",
            Context::Yield => "yield",
            Context::Include => "include",
            Context::Return => "return",
        }
    }
}

struct Parser<'a> {
    name: &'a str,
    template: Arc<str>,
    lex: Lexer<'a>,
    token: [Token<'a>; 3],
    peek_count: usize,
    blocks: HashMap<String, Arc<BlockNode>>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(name: &'a str, source: &'a str, delims: &'a Delims) -> Self {
        let blank = Token {
            kind: TokenKind::Eof,
            text: "".into(),
            pos: Pos::default(),
        };
        Self {
            name,
            template: Arc::from(name),
            lex: lexer::tokenize(source, delims),
            token: [blank.clone(), blank.clone(), blank],
            peek_count: 0,
            blocks: HashMap::new(),
            depth: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Token buffer
    // ═══════════════════════════════════════════════════════════════════

    fn next(&mut self) -> Token<'a> {
        if self.peek_count > 0 {
            self.peek_count -= 1;
        } else {
            self.token[0] = self.lex.next_token();
        }
        self.token[self.peek_count].clone()
    }

    /// Push the last token back.
    fn backup(&mut self) {
        self.peek_count += 1;
    }

    /// Push back two tokens: `t1` and the last one read, which is already in
    /// `token[0]`. `t1` comes out first.
    fn backup2(&mut self, t1: Token<'a>) {
        self.token[1] = t1;
        self.peek_count = 2;
    }

    /// Push back three tokens: `t2`, `t1` and the last one read. `t2` comes
    /// out first.
    fn backup3(&mut self, t2: Token<'a>, t1: Token<'a>) {
        self.token[1] = t1;
        self.token[2] = t2;
        self.peek_count = 3;
    }

    fn peek(&mut self) -> Token<'a> {
        if self.peek_count > 0 {
            return self.token[self.peek_count - 1].clone();
        }
        self.peek_count = 1;
        self.token[0] = self.lex.next_token();
        self.token[0].clone()
    }

    fn next_non_space(&mut self) -> Token<'a> {
        loop {
            let tok = self.next();
            if tok.kind != TokenKind::Space {
                return tok;
            }
        }
    }

    fn peek_non_space(&mut self) -> Token<'a> {
        let tok = self.next_non_space();
        self.backup();
        tok
    }

    // ═══════════════════════════════════════════════════════════════════
    // Errors
    // ═══════════════════════════════════════════════════════════════════

    fn error(&self, reason: ParseReason, pos: Pos, message: impl Into<String>) -> ParseError {
        ParseError {
            reason,
            template: self.name.to_string(),
            message: message.into(),
            pos,
        }
    }

    fn unexpected(&self, tok: &Token<'_>, context: &str) -> ParseError {
        match tok.kind {
            TokenKind::Error => self.error(ParseReason::Lexical, tok.pos, tok.text.to_string()),
            TokenKind::Eof => self.error(
                ParseReason::UnexpectedEof,
                tok.pos,
                format!("unexpected EOF in {context}"),
            ),
            _ => self.error(
                ParseReason::UnexpectedToken,
                tok.pos,
                format!("unexpected {tok} in {context}"),
            ),
        }
    }

    fn expect(&mut self, kind: TokenKind, context: Context) -> Result<Token<'a>, ParseError> {
        let tok = self.next_non_space();
        if tok.kind != kind {
            return Err(self.unexpected(&tok, context.as_str()));
        }
        Ok(tok)
    }

    fn expect_right_delim(&mut self, context: Context) -> Result<(), ParseError> {
        self.expect(TokenKind::RightDelim, context).map(|_| ())
    }

    fn enter(&mut self, pos: Pos) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(
                ParseReason::NestingTooDeep,
                pos,
                format!("nesting depth exceeded (max {MAX_NESTING})"),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Template structure
    // ═══════════════════════════════════════════════════════════════════

    fn parse_template(&mut self) -> Result<ParsedTemplate, ParseError> {
        let mut extends: Option<Reference> = None;
        let mut imports = Vec::new();
        // Blank text is dropped only when a clause follows it.
        let mut blank: Option<Token<'a>> = None;

        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::Text if tok.text.trim().is_empty() => {
                    blank = Some(match blank.take() {
                        Some(mut prev) => {
                            prev.text.to_mut().push_str(&tok.text);
                            prev
                        }
                        None => tok,
                    });
                }
                TokenKind::LeftDelim => {
                    let keyword = self.next_non_space();
                    match keyword.kind {
                        TokenKind::Extends | TokenKind::Import => {
                            let path = self.clause_path(&keyword)?;
                            if keyword.kind == TokenKind::Extends {
                                if extends.is_some() {
                                    return Err(self.error(
                                        ParseReason::UnexpectedClause,
                                        keyword.pos,
                                        "only one extends clause is permitted",
                                    ));
                                }
                                if !imports.is_empty() {
                                    return Err(self.error(
                                        ParseReason::UnexpectedClause,
                                        keyword.pos,
                                        "extends must come before any import clause",
                                    ));
                                }
                                extends = Some(Reference {
                                    path,
                                    pos: keyword.pos,
                                });
                            } else {
                                imports.push(Reference {
                                    path,
                                    pos: keyword.pos,
                                });
                            }
                            blank = None;
                        }
                        _ => {
                            match blank.take() {
                                Some(text) => self.backup3(text, tok),
                                None => self.backup2(tok),
                            }
                            break;
                        }
                    }
                }
                _ => {
                    match blank.take() {
                        Some(text) => self.backup2(text),
                        None => self.backup(),
                    }
                    break;
                }
            }
        }

        let (root, _) = self.item_list(&[Terminator::Eof], "template")?;
        Ok(ParsedTemplate {
            name: self.name.to_string(),
            extends,
            imports,
            root,
            blocks: std::mem::take(&mut self.blocks),
        })
    }

    /// The string literal of an `extends`/`import` clause, through `}}`.
    fn clause_path(&mut self, keyword: &Token<'a>) -> Result<String, ParseError> {
        let context = if keyword.kind == TokenKind::Extends {
            "extends"
        } else {
            "import"
        };
        let tok = self.next_non_space();
        let path = match tok.kind {
            TokenKind::String | TokenKind::RawString => lexer::unquote(&tok.text)
                .map_err(|e| self.error(ParseReason::InvalidLiteral, tok.pos, e))?,
            _ => return Err(self.unexpected(&tok, context)),
        };
        let close = self.next_non_space();
        if close.kind != TokenKind::RightDelim {
            return Err(self.unexpected(&close, context));
        }
        Ok(path)
    }

    /// Parse items until one of `ends` is reached.
    fn item_list(
        &mut self,
        ends: &[Terminator],
        context: &str,
    ) -> Result<(Vec<Node>, EndItem), ParseError> {
        let mut list = Vec::new();
        loop {
            match self.text_or_action()? {
                Item::Node(node) => list.push(node),
                Item::End(end) if ends.contains(&end.kind) => return Ok((list, end)),
                Item::End(end) if end.kind == Terminator::Eof => {
                    let expected = ends
                        .iter()
                        .map(|t| t.describe())
                        .collect::<Vec<_>>()
                        .join(" or ");
                    return Err(self.error(
                        ParseReason::UnexpectedEof,
                        end.pos,
                        format!("unexpected EOF in {context}, expected {expected}"),
                    ));
                }
                Item::End(end) => {
                    return Err(self.error(
                        ParseReason::UnexpectedToken,
                        end.pos,
                        format!("unexpected {} in {context}", end.kind.describe()),
                    ));
                }
            }
        }
    }

    fn text_or_action(&mut self) -> Result<Item, ParseError> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Text => Ok(Item::Node(Node::Text(TextNode {
                pos: tok.pos,
                text: tok.text.into_owned(),
            }))),
            TokenKind::LeftDelim => {
                self.enter(tok.pos)?;
                let item = self.action(tok.pos);
                self.leave();
                item
            }
            TokenKind::Eof => Ok(Item::End(EndItem {
                kind: Terminator::Eof,
                pos: tok.pos,
                binding: None,
            })),
            _ => Err(self.unexpected(&tok, "input")),
        }
    }

    /// Everything after a left delimiter.
    fn action(&mut self, pos: Pos) -> Result<Item, ParseError> {
        let tok = self.next_non_space();
        let end = |kind: Terminator, binding: Option<String>| -> Result<Item, ParseError> {
            Ok(Item::End(EndItem {
                kind,
                pos: tok.pos,
                binding,
            }))
        };
        match tok.kind {
            TokenKind::End => {
                self.expect_right_delim(Context::Action)?;
                end(Terminator::End, None)
            }
            TokenKind::Else => {
                if self.peek_non_space().kind == TokenKind::If {
                    // The nested if consumes the `if` and shares our `end`.
                    return end(Terminator::ElseIf, None);
                }
                self.expect_right_delim(Context::Action)?;
                end(Terminator::Else, None)
            }
            TokenKind::Content => {
                self.expect_right_delim(Context::Block)?;
                end(Terminator::Content, None)
            }
            TokenKind::Catch => {
                let next = self.next_non_space();
                let binding = match next.kind {
                    TokenKind::Ident => {
                        self.expect_right_delim(Context::Action)?;
                        Some(next.text.into_owned())
                    }
                    TokenKind::RightDelim => None,
                    _ => return Err(self.unexpected(&next, "catch")),
                };
                end(Terminator::Catch, binding)
            }
            TokenKind::If => self.parse_if(tok.pos).map(Item::Node),
            TokenKind::Range => self.parse_range(tok.pos).map(Item::Node),
            TokenKind::Try => self.parse_try(tok.pos).map(Item::Node),
            TokenKind::Block => self.parse_block(tok.pos).map(Item::Node),
            TokenKind::Yield => self.parse_yield(tok.pos).map(Item::Node),
            TokenKind::Include => self.parse_include(tok.pos).map(Item::Node),
            TokenKind::Return => self.parse_return(tok.pos).map(Item::Node),
            TokenKind::Extends | TokenKind::Import => Err(self.error(
                ParseReason::UnexpectedClause,
                tok.pos,
                format!("unexpected {tok} clause, only allowed at the start of a template"),
            )),
            TokenKind::RightDelim => Err(self.error(
                ParseReason::UnexpectedToken,
                tok.pos,
                "missing value for command",
            )),
            _ => {
                self.backup();
                self.parse_action(pos).map(Item::Node)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════

    fn parse_action(&mut self, pos: Pos) -> Result<Node, ParseError> {
        let body = match self.assignment_or_expression(Context::Action)? {
            Assigned::Set(set) => ActionBody::Set(set),
            Assigned::Expr(first) => ActionBody::Pipeline(self.pipeline(first)?),
        };
        self.expect_right_delim(Context::Action)?;
        Ok(Node::Action(ActionNode { pos, body }))
    }

    fn pipeline(&mut self, first: Expr) -> Result<PipelineNode, ParseError> {
        let pos = first.pos;
        let mut commands = vec![self.command_args(first)?];
        while self.peek_non_space().kind == TokenKind::Pipe {
            self.next_non_space();
            let expr = self.expression(Context::Action)?;
            commands.push(self.command_args(expr)?);
        }
        Ok(PipelineNode { pos, commands })
    }

    /// Optional `: a, b` after a command expression.
    fn command_args(&mut self, expr: Expr) -> Result<CommandNode, ParseError> {
        let pos = expr.pos;
        let args = if self.peek_non_space().kind == TokenKind::Colon {
            self.next_non_space();
            Some(self.expression_list(Context::Action)?)
        } else {
            None
        };
        Ok(CommandNode { pos, expr, args })
    }

    fn expression_list(&mut self, context: Context) -> Result<Vec<Expr>, ParseError> {
        let mut list = vec![self.expression(context)?];
        while self.peek_non_space().kind == TokenKind::Comma {
            self.next_non_space();
            list.push(self.expression(context)?);
        }
        Ok(list)
    }

    fn assignment_or_expression(&mut self, context: Context) -> Result<Assigned, ParseError> {
        let first = self.expression(context)?;
        let pos = first.pos;
        let mut tok = self.next_non_space();
        if !matches!(
            tok.kind,
            TokenKind::Comma | TokenKind::Assign | TokenKind::Declare
        ) {
            self.backup();
            return Ok(Assigned::Expr(first));
        }

        let mut targets = Vec::new();
        let mut operand = first;
        let declaration = loop {
            if !operand.is_assignable() {
                return Err(self.error(
                    ParseReason::InvalidAssignment,
                    operand.pos,
                    format!("unexpected {operand} in assignment"),
                ));
            }
            targets.push(operand);
            match tok.kind {
                TokenKind::Comma => {
                    operand = self.expression(context)?;
                    tok = self.next_non_space();
                }
                TokenKind::Assign => break false,
                TokenKind::Declare => break true,
                _ => return Err(self.unexpected(&tok, "assignment")),
            }
        };

        if declaration {
            if let Some(bad) = targets.iter().find(|t| {
                !matches!(t.kind, ExprKind::Identifier(_) | ExprKind::Underscore)
            }) {
                return Err(self.error(
                    ParseReason::InvalidAssignment,
                    bad.pos,
                    format!("unexpected {bad} in variable declaration"),
                ));
            }
        }

        let values = self.expression_list(context)?;

        let mut index_lookup = false;
        if context == Context::Range {
            if targets.len() > 2 || values.len() != 1 {
                return Err(self.error(
                    ParseReason::InvalidAssignment,
                    pos,
                    "range permits at most two variables and exactly one collection",
                ));
            }
        } else if targets.len() != values.len() {
            let lookup = targets.len() == 2
                && values.len() == 1
                && matches!(values[0].kind, ExprKind::Index { .. });
            if !lookup {
                return Err(self.error(
                    ParseReason::InvalidAssignment,
                    pos,
                    format!(
                        "assignment mismatch: {} variables but {} values",
                        targets.len(),
                        values.len()
                    ),
                ));
            }
            index_lookup = true;
        }

        Ok(Assigned::Set(SetNode {
            pos,
            targets,
            values,
            declaration,
            index_lookup,
        }))
    }

    fn parse_if(&mut self, pos: Pos) -> Result<Node, ParseError> {
        let (set, condition) = match self.assignment_or_expression(Context::If)? {
            Assigned::Set(set) => {
                self.expect(TokenKind::Semicolon, Context::If)?;
                (Some(set), self.expression(Context::If)?)
            }
            Assigned::Expr(expr) => (None, expr),
        };
        self.expect_right_delim(Context::If)?;

        let (body, end) = self.item_list(
            &[Terminator::End, Terminator::Else, Terminator::ElseIf],
            "if",
        )?;
        let else_body = match end.kind {
            Terminator::Else => Some(self.item_list(&[Terminator::End], "else")?.0),
            Terminator::ElseIf => {
                let tok = self.expect(TokenKind::If, Context::If)?;
                Some(vec![self.parse_if(tok.pos)?])
            }
            _ => None,
        };

        Ok(Node::If(IfNode {
            pos,
            set,
            condition,
            body,
            else_body,
        }))
    }

    fn parse_range(&mut self, pos: Pos) -> Result<Node, ParseError> {
        let (set, collection) = match self.assignment_or_expression(Context::Range)? {
            Assigned::Set(mut set) => {
                let collection = set.values.remove(0);
                (Some(set), collection)
            }
            Assigned::Expr(expr) => (None, expr),
        };
        self.expect_right_delim(Context::Range)?;

        let (body, end) = self.item_list(&[Terminator::End, Terminator::Else], "range")?;
        let else_body = match end.kind {
            Terminator::Else => Some(self.item_list(&[Terminator::End], "else")?.0),
            _ => None,
        };

        Ok(Node::Range(RangeNode {
            pos,
            set,
            collection,
            body,
            else_body,
        }))
    }

    fn parse_try(&mut self, pos: Pos) -> Result<Node, ParseError> {
        self.expect_right_delim(Context::Action)?;
        let (body, end) = self.item_list(&[Terminator::End, Terminator::Catch], "try")?;
        let catch = match end.kind {
            Terminator::Catch => {
                let (catch_body, _) = self.item_list(&[Terminator::End], "catch")?;
                Some(CatchNode {
                    pos: end.pos,
                    binding: end.binding,
                    body: catch_body,
                })
            }
            _ => None,
        };
        Ok(Node::Try(TryNode { pos, body, catch }))
    }

    fn parse_block(&mut self, pos: Pos) -> Result<Node, ParseError> {
        let name = self.expect(TokenKind::Ident, Context::Block)?;
        let name = name.text.into_owned();

        self.expect(TokenKind::LParen, Context::Block)?;
        let mut params: Vec<BlockParam> = Vec::new();
        if self.peek_non_space().kind == TokenKind::RParen {
            self.next_non_space();
        } else {
            loop {
                let param = self.expect(TokenKind::Ident, Context::Block)?;
                if params.iter().any(|p| p.name == param.text) {
                    return Err(self.error(
                        ParseReason::DuplicateParameter,
                        param.pos,
                        format!("duplicate parameter {} in block {name}", param.text),
                    ));
                }
                let default = if self.peek_non_space().kind == TokenKind::Assign {
                    self.next_non_space();
                    Some(self.expression(Context::Block)?)
                } else {
                    None
                };
                params.push(BlockParam {
                    name: param.text.into_owned(),
                    default,
                });
                let sep = self.next_non_space();
                match sep.kind {
                    TokenKind::Comma => continue,
                    TokenKind::RParen => break,
                    _ => return Err(self.unexpected(&sep, "block parameters")),
                }
            }
        }

        let context = if self.peek_non_space().kind != TokenKind::RightDelim {
            Some(self.expression(Context::Block)?)
        } else {
            None
        };
        self.expect_right_delim(Context::Block)?;

        let (body, end) = self.item_list(&[Terminator::End, Terminator::Content], "block")?;
        let content = match end.kind {
            Terminator::Content => {
                let (content, _) = self.item_list(&[Terminator::End], "block content")?;
                Some(Arc::from(content))
            }
            _ => None,
        };

        let block = Arc::new(BlockNode {
            pos,
            template: self.template.clone(),
            name: name.clone(),
            params,
            context,
            body,
            content,
        });
        self.blocks.insert(name, block.clone());
        Ok(Node::Block(block))
    }

    fn parse_yield(&mut self, pos: Pos) -> Result<Node, ParseError> {
        let tok = self.next_non_space();
        let (name, args) = match tok.kind {
            TokenKind::Content => (None, Vec::new()),
            TokenKind::Ident => {
                self.expect(TokenKind::LParen, Context::Yield)?;
                (Some(tok.text.into_owned()), self.yield_args()?)
            }
            _ => return Err(self.unexpected(&tok, "yield")),
        };

        let context = match self.peek_non_space().kind {
            TokenKind::RightDelim | TokenKind::Content => None,
            _ => Some(self.expression(Context::Yield)?),
        };

        let mut content = None;
        if name.is_some() && self.peek_non_space().kind == TokenKind::Content {
            self.next_non_space();
            self.expect_right_delim(Context::Yield)?;
            let (body, _) = self.item_list(&[Terminator::End], "yield content")?;
            content = Some(Arc::from(body));
        } else {
            self.expect_right_delim(Context::Yield)?;
        }

        Ok(Node::Yield(YieldNode {
            pos,
            template: self.template.clone(),
            name,
            args,
            context,
            content,
        }))
    }

    /// `name=value` or positional arguments, through the closing paren.
    fn yield_args(&mut self) -> Result<Vec<YieldArg>, ParseError> {
        let mut args = Vec::new();
        if self.peek_non_space().kind == TokenKind::RParen {
            self.next_non_space();
            return Ok(args);
        }
        loop {
            let expr = self.expression(Context::Yield)?;
            let arg = match (&expr.kind, self.peek_non_space().kind) {
                (ExprKind::Identifier(name), TokenKind::Assign) => {
                    let name = name.clone();
                    self.next_non_space();
                    YieldArg {
                        name: Some(name),
                        value: self.expression(Context::Yield)?,
                    }
                }
                _ => YieldArg {
                    name: None,
                    value: expr,
                },
            };
            args.push(arg);
            let sep = self.next_non_space();
            match sep.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                _ => return Err(self.unexpected(&sep, "yield arguments")),
            }
        }
    }

    fn parse_include(&mut self, pos: Pos) -> Result<Node, ParseError> {
        let name = self.expression(Context::Include)?;
        let context = if self.peek_non_space().kind != TokenKind::RightDelim {
            Some(self.expression(Context::Include)?)
        } else {
            None
        };
        self.expect_right_delim(Context::Include)?;
        Ok(Node::Include(IncludeNode {
            pos,
            template: self.template.clone(),
            name,
            context,
        }))
    }

    fn parse_return(&mut self, pos: Pos) -> Result<Node, ParseError> {
        let value = self.expression(Context::Return)?;
        self.expect_right_delim(Context::Return)?;
        Ok(Node::Return(ReturnNode { pos, value }))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════

    fn expression(&mut self, context: Context) -> Result<Expr, ParseError> {
        let start = self.peek_non_space().pos;
        self.enter(start)?;
        let condition = self.logical(context)?;
        let expr = if self.peek_non_space().kind == TokenKind::Question {
            self.next_non_space();
            let left = self.expression(context)?;
            self.expect(TokenKind::Colon, context)?;
            let right = self.expression(context)?;
            Expr::new(
                condition.pos,
                ExprKind::Ternary {
                    condition: Box::new(condition),
                    left: Box::new(left),
                    right: Box::new(right),
                },
            )
        } else {
            condition
        };
        self.leave();
        Ok(expr)
    }

    fn logical(&mut self, context: Context) -> Result<Expr, ParseError> {
        let mut left = self.comparative(context)?;
        loop {
            let op = match self.peek_non_space().kind {
                TokenKind::AndAnd | TokenKind::And => LogicalOp::And,
                TokenKind::OrOr | TokenKind::Or => LogicalOp::Or,
                _ => return Ok(left),
            };
            self.next_non_space();
            let right = self.comparative(context)?;
            left = Expr::new(
                left.pos,
                ExprKind::Logical {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            );
        }
    }

    fn comparative(&mut self, context: Context) -> Result<Expr, ParseError> {
        let mut left = self.numeric_comparative(context)?;
        loop {
            let op = match self.peek_non_space().kind {
                TokenKind::Equals => ComparativeOp::Eq,
                TokenKind::NotEquals => ComparativeOp::Ne,
                _ => return Ok(left),
            };
            self.next_non_space();
            let right = self.numeric_comparative(context)?;
            left = Expr::new(
                left.pos,
                ExprKind::Comparative {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            );
        }
    }

    fn numeric_comparative(&mut self, context: Context) -> Result<Expr, ParseError> {
        let mut left = self.additive(context)?;
        loop {
            let op = match self.peek_non_space().kind {
                TokenKind::Greater => NumericComparativeOp::Gt,
                TokenKind::GreaterEquals => NumericComparativeOp::Ge,
                TokenKind::Less => NumericComparativeOp::Lt,
                TokenKind::LessEquals => NumericComparativeOp::Le,
                _ => return Ok(left),
            };
            self.next_non_space();
            let right = self.additive(context)?;
            left = Expr::new(
                left.pos,
                ExprKind::NumericComparative {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            );
        }
    }

    fn additive(&mut self, context: Context) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative(context)?;
        loop {
            let op = match self.peek_non_space().kind {
                TokenKind::Plus => AdditiveOp::Add,
                TokenKind::Minus => AdditiveOp::Sub,
                _ => return Ok(left),
            };
            self.next_non_space();
            let right = self.multiplicative(context)?;
            left = Expr::new(
                left.pos,
                ExprKind::Additive {
                    left: Some(Box::new(left)),
                    op,
                    right: Box::new(right),
                },
            );
        }
    }

    fn multiplicative(&mut self, context: Context) -> Result<Expr, ParseError> {
        let mut left = self.unary(context)?;
        loop {
            let op = match self.peek_non_space().kind {
                TokenKind::Star => MultiplicativeOp::Mul,
                TokenKind::Slash => MultiplicativeOp::Div,
                TokenKind::Percent => MultiplicativeOp::Mod,
                _ => return Ok(left),
            };
            self.next_non_space();
            let right = self.unary(context)?;
            left = Expr::new(
                left.pos,
                ExprKind::Multiplicative {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            );
        }
    }

    fn unary(&mut self, context: Context) -> Result<Expr, ParseError> {
        let tok = self.peek_non_space();
        let kind = match tok.kind {
            TokenKind::Bang | TokenKind::Not => {
                self.next_non_space();
                self.enter(tok.pos)?;
                let inner = self.unary(context)?;
                self.leave();
                ExprKind::Not(Box::new(inner))
            }
            TokenKind::Plus | TokenKind::Minus => {
                self.next_non_space();
                self.enter(tok.pos)?;
                let right = self.unary(context)?;
                self.leave();
                let op = if tok.kind == TokenKind::Plus {
                    AdditiveOp::Add
                } else {
                    AdditiveOp::Sub
                };
                ExprKind::Additive {
                    left: None,
                    op,
                    right: Box::new(right),
                }
            }
            _ => return self.operand(context),
        };
        Ok(Expr::new(tok.pos, kind))
    }

    /// A term followed by any adjacent field, call, index or slice suffixes.
    fn operand(&mut self, context: Context) -> Result<Expr, ParseError> {
        let mut expr = self.term(context)?;
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Field | TokenKind::LaxField => {
                    let path = self.field_path();
                    expr = match expr.kind {
                        ExprKind::Chain { base, path: mut head } => {
                            head.extend(path);
                            Expr::new(expr.pos, ExprKind::Chain { base, path: head })
                        }
                        _ => Expr::new(
                            expr.pos,
                            ExprKind::Chain {
                                base: Box::new(expr),
                                path,
                            },
                        ),
                    };
                }
                TokenKind::LParen => {
                    self.next();
                    let args = self.call_args()?;
                    expr = Expr::new(
                        expr.pos,
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                    );
                }
                TokenKind::LBracket | TokenKind::LaxIndex => {
                    self.next();
                    expr = self.index_or_slice(expr, tok.kind == TokenKind::LaxIndex)?;
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Consecutive `.Name` / `?.Name` tokens with no space between them.
    fn field_path(&mut self) -> Vec<FieldSegment> {
        let mut path = Vec::new();
        loop {
            let tok = self.peek();
            let segment = match tok.kind {
                TokenKind::Field => FieldSegment::new(&tok.text[1..], false),
                TokenKind::LaxField => FieldSegment::new(&tok.text[2..], true),
                _ => return path,
            };
            self.next();
            path.push(segment);
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.peek_non_space().kind == TokenKind::RParen {
            self.next_non_space();
            return Ok(args);
        }
        loop {
            args.push(self.expression(Context::Action)?);
            let sep = self.next_non_space();
            match sep.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                _ => return Err(self.unexpected(&sep, "call arguments")),
            }
        }
    }

    fn index_or_slice(&mut self, base: Expr, nullable: bool) -> Result<Expr, ParseError> {
        let pos = base.pos;
        let start = if self.peek_non_space().kind == TokenKind::Colon {
            None
        } else {
            Some(Box::new(self.expression(Context::Action)?))
        };

        let tok = self.next_non_space();
        match tok.kind {
            TokenKind::RBracket => match start {
                Some(key) => Ok(Expr::new(
                    pos,
                    ExprKind::Index {
                        base: Box::new(base),
                        key,
                        nullable,
                    },
                )),
                None => Err(self.unexpected(&tok, "index")),
            },
            TokenKind::Colon if !nullable => {
                let end = if self.peek_non_space().kind == TokenKind::RBracket {
                    None
                } else {
                    Some(Box::new(self.expression(Context::Action)?))
                };
                self.expect(TokenKind::RBracket, Context::Action)?;
                Ok(Expr::new(
                    pos,
                    ExprKind::Slice {
                        base: Box::new(base),
                        start,
                        end,
                    },
                ))
            }
            _ => Err(self.unexpected(&tok, "index")),
        }
    }

    fn term(&mut self, context: Context) -> Result<Expr, ParseError> {
        let tok = self.next_non_space();
        let kind = match tok.kind {
            TokenKind::Ident => ExprKind::Identifier(tok.text.into_owned()),
            TokenKind::Underscore => ExprKind::Underscore,
            TokenKind::Dot => ExprKind::Field(Vec::new()),
            TokenKind::Field | TokenKind::LaxField => {
                self.backup();
                ExprKind::Field(self.field_path())
            }
            TokenKind::String | TokenKind::RawString => {
                let value = lexer::unquote(&tok.text)
                    .map_err(|e| self.error(ParseReason::InvalidLiteral, tok.pos, e))?;
                ExprKind::String(value)
            }
            TokenKind::Number => {
                let value = match lexer::parse_number(&tok.text) {
                    Ok(NumberLit::Int(v)) => NumberValue::Int(v),
                    Ok(NumberLit::Uint(v)) => NumberValue::Uint(v),
                    Ok(NumberLit::Float(v)) => NumberValue::Float(v),
                    Ok(NumberLit::Complex) => {
                        return Err(self.error(
                            ParseReason::InvalidLiteral,
                            tok.pos,
                            format!("complex number {} is not supported", tok.text),
                        ))
                    }
                    Err(e) => return Err(self.error(ParseReason::InvalidLiteral, tok.pos, e)),
                };
                ExprKind::Number(Number {
                    text: tok.text.into_owned(),
                    value,
                })
            }
            TokenKind::Bool => ExprKind::Bool(tok.text == "true"),
            TokenKind::Nil => ExprKind::Nil,
            TokenKind::LParen => {
                self.enter(tok.pos)?;
                let inner = self.expression(context)?;
                self.expect(TokenKind::RParen, context)?;
                self.leave();
                return Ok(inner);
            }
            _ => return Err(self.unexpected(&tok, context.as_str())),
        };
        Ok(Expr::new(tok.pos, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> ParsedTemplate {
        match parse_default("/test.jet", source) {
            Ok(t) => t,
            Err(e) => panic!("parse failed: {e}"),
        }
    }

    #[test]
    fn backup_buffers_three_tokens() {
        let delims = Delims::default();
        let mut parser = Parser::new("/t", "{{ a }}", &delims);
        let t1 = parser.next();
        let t2 = parser.next();
        let t3 = parser.next();
        assert_eq!(t1.kind, TokenKind::LeftDelim);
        assert_eq!(t2.kind, TokenKind::Space);
        assert_eq!(t3.kind, TokenKind::Ident);
        parser.backup3(t1.clone(), t2.clone());
        assert_eq!(parser.next().kind, TokenKind::LeftDelim);
        assert_eq!(parser.next().kind, TokenKind::Space);
        assert_eq!(parser.next().kind, TokenKind::Ident);
        assert_eq!(parser.next_non_space().kind, TokenKind::RightDelim);
    }

    #[test]
    fn whitespace_before_extends_is_dropped() {
        let t = parse_ok("  \n{{ extends \"base.jet\" }}\n{{ import \"lib\" }}body");
        assert_eq!(t.extends.as_ref().map(|r| r.path.as_str()), Some("base.jet"));
        assert_eq!(t.imports.len(), 1);
        assert_eq!(t.root.len(), 1);
    }

    #[test]
    fn whitespace_without_clause_is_kept() {
        let t = parse_ok("  {{ x }}");
        assert_eq!(t.root[0].node_type(), NodeType::Text);
        assert_eq!(t.root[1].node_type(), NodeType::Action);
    }

    #[test]
    fn blocks_are_recorded() {
        let t = parse_ok("{{ block a() }}{{ block b(x, y=1) }}{{ end }}{{ end }}");
        assert!(t.blocks.contains_key("a"));
        assert_eq!(t.blocks["b"].params.len(), 2);
    }
}
