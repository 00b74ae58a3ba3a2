//! Lexer for stencil template source.
//!
//! Template source is a mix of literal text and delimited actions. The outer
//! scanner splits the two by hand, since the delimiters are configurable per
//! template set. Inside an action the token kinds are recognised by a
//! logos-generated automaton, one token at a time.
//!
//! # Token Categories
//!
//! - **Structure**: text runs, left/right delimiters, whitespace inside actions
//! - **Keywords**: `if`, `else`, `range`, `end`, `block`, `yield`, `content`,
//!   `include`, `extends`, `import`, `try`, `catch`, `return`, `and`, `or`, `not`
//! - **Literals**: strings, raw strings, numbers, `true`/`false`, `nil`
//! - **Accessors**: `.Name`, `?.Name`, the bare context dot `.`
//! - **Operators**: `+ - * / % == != > >= < <= && || ! ? : | = :=`
//!
//! Malformed input produces a single [`TokenKind::Error`] token carrying the
//! message; after it the lexer only yields [`TokenKind::Eof`].
//!
//! Two conveniences sit on top of the delimiters: `{{- ` and ` -}}` trim the
//! whitespace around an action, and `{{* ... *}}` is a comment.

use logos::Logos;
use std::borrow::Cow;
use std::fmt;

pub const DEFAULT_LEFT_DELIM: &str = "{{";
pub const DEFAULT_RIGHT_DELIM: &str = "}}";

/// Action delimiters used by a template set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delims {
    pub left: String,
    pub right: String,
}

impl Delims {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl Default for Delims {
    fn default() -> Self {
        Self::new(DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM)
    }
}

/// Location of a token or node in the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Pos {
    /// Byte offset from the start of the source.
    pub offset: usize,
    /// One-based line number.
    pub line: usize,
}

impl Pos {
    pub fn new(offset: usize, line: usize) -> Self {
        Self { offset, line }
    }
}

/// Token kinds.
///
/// The first group is produced by the delimiter scanner; everything else is
/// matched by logos inside an action.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // ═══════════════════════════════════════════════════════════════════
    // Structure (produced by the delimiter scanner)
    // ═══════════════════════════════════════════════════════════════════
    Text,
    LeftDelim,
    RightDelim,
    Error,
    Eof,

    #[regex(r"[ \t\r\n]+")]
    Space,

    // ═══════════════════════════════════════════════════════════════════
    // Keywords (tokens outrank the identifier regex)
    // ═══════════════════════════════════════════════════════════════════
    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("range")]
    Range,

    #[token("end")]
    End,

    #[token("block")]
    Block,

    #[token("yield")]
    Yield,

    #[token("content")]
    Content,

    #[token("include")]
    Include,

    #[token("extends")]
    Extends,

    #[token("import")]
    Import,

    #[token("try")]
    Try,

    #[token("catch")]
    Catch,

    #[token("return")]
    Return,

    #[token("and")]
    And,

    #[token("or")]
    Or,

    #[token("not")]
    Not,

    #[token("true")]
    #[token("false")]
    Bool,

    #[token("nil")]
    Nil,

    // ═══════════════════════════════════════════════════════════════════
    // Multi-character operators
    // ═══════════════════════════════════════════════════════════════════
    #[token(":=")]
    Declare,

    #[token("==")]
    Equals,

    #[token("!=")]
    NotEquals,

    #[token(">=")]
    GreaterEquals,

    #[token("<=")]
    LessEquals,

    #[token("&&")]
    AndAnd,

    #[token("||")]
    OrOr,

    #[token("?[")]
    LaxIndex,

    // ═══════════════════════════════════════════════════════════════════
    // Single-character operators and punctuation
    // ═══════════════════════════════════════════════════════════════════
    #[token("=")]
    Assign,

    #[token(">")]
    Greater,

    #[token("<")]
    Less,

    #[token("!")]
    Bang,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("?")]
    Question,

    #[token(":")]
    Colon,

    #[token("|")]
    Pipe,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(".")]
    Dot,

    #[token("_", priority = 3)]
    Underscore,

    // ═══════════════════════════════════════════════════════════════════
    // Names and literals
    // ═══════════════════════════════════════════════════════════════════
    #[regex(r"\.[A-Za-z_][A-Za-z0-9_]*")]
    Field,

    #[regex(r"\?\.[A-Za-z_][A-Za-z0-9_]*")]
    LaxField,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    String,

    #[regex(r"`[^`]*`")]
    RawString,

    /// Deliberately loose; [`parse_number`] decides what is valid.
    #[regex(r"[0-9][0-9A-Za-z_]*(\.[0-9A-Za-z_]*)?([eEpP][+-][0-9_]+)?i?")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?i?")]
    Number,
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::If
                | TokenKind::Else
                | TokenKind::Range
                | TokenKind::End
                | TokenKind::Block
                | TokenKind::Yield
                | TokenKind::Content
                | TokenKind::Include
                | TokenKind::Extends
                | TokenKind::Import
                | TokenKind::Try
                | TokenKind::Catch
                | TokenKind::Return
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
        )
    }
}

/// A token with its source text and position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// Source text of the token, or the message for [`TokenKind::Error`].
    pub text: Cow<'src, str>,
    pub pos: Pos,
}

impl<'src> Token<'src> {
    fn new(kind: TokenKind, text: impl Into<Cow<'src, str>>, pos: Pos) -> Self {
        Self {
            kind,
            text: text.into(),
            pos,
        }
    }

    pub fn line(&self) -> usize {
        self.pos.line
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Error => write!(f, "{}", self.text),
            TokenKind::Text if self.text.chars().count() > 20 => {
                let head: String = self.text.chars().take(20).collect();
                write!(f, "{head:?}...")
            }
            TokenKind::Space => write!(f, "space"),
            _ => write!(f, "{:?}", self.text),
        }
    }
}

/// Hand-driven lexer over a template source.
///
/// Call [`Lexer::next_token`] repeatedly; once the input is exhausted it keeps
/// returning [`TokenKind::Eof`]. The [`Iterator`] impl stops before `Eof`.
pub struct Lexer<'src> {
    source: &'src str,
    left: &'src str,
    right: &'src str,
    offset: usize,
    line: usize,
    in_action: bool,
    trim_next_text: bool,
    done: bool,
    pending: Option<Token<'src>>,
}

/// Tokenize `source` using the given delimiters.
pub fn tokenize<'src>(source: &'src str, delims: &'src Delims) -> Lexer<'src> {
    Lexer::new(source, &delims.left, &delims.right)
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn count_lines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, left: &'src str, right: &'src str) -> Self {
        Self {
            source,
            left,
            right,
            offset: 0,
            line: 1,
            in_action: false,
            trim_next_text: false,
            done: false,
            pending: None,
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.offset, self.line)
    }

    fn rest(&self) -> &'src str {
        &self.source[self.offset..]
    }

    /// Advance over `len` bytes, keeping the line counter in sync.
    fn advance(&mut self, len: usize) -> &'src str {
        let text = &self.source[self.offset..self.offset + len];
        self.offset += len;
        self.line += count_lines(text);
        text
    }

    fn error(&mut self, message: impl Into<String>) -> Token<'src> {
        self.done = true;
        self.pending = None;
        Token::new(TokenKind::Error, message.into(), self.pos())
    }

    fn eof(&mut self) -> Token<'src> {
        self.done = true;
        Token::new(TokenKind::Eof, "", self.pos())
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Token<'src> {
        if let Some(tok) = self.pending.take() {
            return tok;
        }
        if self.done {
            return Token::new(TokenKind::Eof, "", self.pos());
        }
        if self.in_action {
            self.lex_inside_action()
        } else {
            self.lex_text()
        }
    }

    fn lex_text(&mut self) -> Token<'src> {
        loop {
            let rest = self.rest();
            let Some(idx) = rest.find(self.left) else {
                if rest.is_empty() {
                    return self.eof();
                }
                let start = self.pos();
                let text = self.advance(rest.len());
                let text = if std::mem::take(&mut self.trim_next_text) {
                    text.trim_start_matches(is_space)
                } else {
                    text
                };
                if text.is_empty() {
                    return self.eof();
                }
                return Token::new(TokenKind::Text, text, start);
            };

            let after_left = &rest[idx + self.left.len()..];

            // Comments vanish, leaving the text on either side as separate runs.
            if after_left.starts_with('*') {
                let close = format!("*{}", self.right);
                let Some(end) = after_left[1..].find(&close) else {
                    self.advance(idx);
                    return self.error("unclosed comment");
                };
                let start = self.pos();
                let text = self.advance(idx);
                let text = if std::mem::take(&mut self.trim_next_text) {
                    text.trim_start_matches(is_space)
                } else {
                    text
                };
                self.advance(self.left.len() + 1 + end + close.len());
                if text.is_empty() {
                    continue;
                }
                return Token::new(TokenKind::Text, text, start);
            }

            let trim_left = after_left.starts_with('-')
                && after_left[1..].starts_with(is_space);

            let start = self.pos();
            let mut text = self.advance(idx);
            if std::mem::take(&mut self.trim_next_text) {
                text = text.trim_start_matches(is_space);
            }
            if trim_left {
                text = text.trim_end_matches(is_space);
            }

            let delim_pos = self.pos();
            let delim_len = self.left.len() + usize::from(trim_left);
            let delim = self.advance(delim_len);
            self.in_action = true;
            let delim = Token::new(TokenKind::LeftDelim, &delim[..self.left.len()], delim_pos);

            if text.is_empty() {
                return delim;
            }
            self.pending = Some(delim);
            return Token::new(TokenKind::Text, text, start);
        }
    }

    fn lex_inside_action(&mut self) -> Token<'src> {
        let rest = self.rest();
        if rest.is_empty() {
            return self.error("unclosed action");
        }

        if rest.starts_with(self.right) {
            let pos = self.pos();
            let text = self.advance(self.right.len());
            self.in_action = false;
            return Token::new(TokenKind::RightDelim, text, pos);
        }

        // ` -}}` closes the action and trims the text that follows.
        let body = rest.trim_start_matches(is_space);
        let ws = rest.len() - body.len();
        if ws > 0 && body.starts_with('-') && body[1..].starts_with(self.right) {
            self.advance(ws + 1);
            let pos = self.pos();
            let text = self.advance(self.right.len());
            self.in_action = false;
            self.trim_next_text = true;
            return Token::new(TokenKind::RightDelim, text, pos);
        }

        let mut lex = TokenKind::lexer(rest);
        match lex.next() {
            Some(Ok(kind)) => {
                let len = lex.span().end;
                let pos = self.pos();
                let text = self.advance(len);
                if kind == TokenKind::Number {
                    if let Err(message) = parse_number(text) {
                        self.offset = pos.offset;
                        self.line = pos.line;
                        return self.error(message);
                    }
                }
                Token::new(kind, text, pos)
            }
            Some(Err(())) => {
                let message = match rest.chars().next() {
                    Some('"') => "unterminated quoted string".to_string(),
                    Some('`') => "unterminated raw quoted string".to_string(),
                    Some(c) => format!("unrecognized character in action: {c:?}"),
                    None => "unclosed action".to_string(),
                };
                self.error(message)
            }
            None => self.error("unclosed action"),
        }
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        let tok = self.next_token();
        match tok.kind {
            TokenKind::Eof => None,
            _ => Some(tok),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Literal decoding
// ═══════════════════════════════════════════════════════════════════════════

/// A decoded numeric literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberLit {
    Int(i64),
    Uint(u64),
    Float(f64),
    /// Imaginary literal such as `2i`. Lexed, but rejected by the parser.
    Complex,
}

/// Decode a numeric literal.
///
/// Accepts decimal, `0x`, `0o` (and Go-style leading `0`), `0b`, `_`
/// separators, fractions and exponents. Integers that fit in `i64` become
/// `Int`, larger ones `Uint`, and anything beyond `u64` falls back to `Float`.
pub fn parse_number(text: &str) -> Result<NumberLit, String> {
    let invalid = || format!("bad number syntax: {text:?}");
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    if cleaned.is_empty() {
        return Err(invalid());
    }

    if let Some(body) = cleaned.strip_suffix('i') {
        return match parse_number(body) {
            Ok(_) => Ok(NumberLit::Complex),
            Err(_) => Err(invalid()),
        };
    }

    let lower = cleaned.to_ascii_lowercase();
    let radix = if let Some(digits) = lower.strip_prefix("0x") {
        Some((16, digits.to_string()))
    } else if let Some(digits) = lower.strip_prefix("0o") {
        Some((8, digits.to_string()))
    } else if let Some(digits) = lower.strip_prefix("0b") {
        Some((2, digits.to_string()))
    } else if lower.len() > 1
        && lower.starts_with('0')
        && lower.bytes().all(|b| b.is_ascii_digit())
    {
        Some((8, lower[1..].to_string()))
    } else {
        None
    };

    if let Some((radix, digits)) = radix {
        if digits.is_empty() {
            return Err(invalid());
        }
        let value = u64::from_str_radix(&digits, radix).map_err(|_| invalid())?;
        return Ok(match i64::try_from(value) {
            Ok(v) => NumberLit::Int(v),
            Err(_) => NumberLit::Uint(value),
        });
    }

    if !lower
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'+' | b'-'))
    {
        return Err(invalid());
    }

    if lower.contains(['.', 'e']) {
        return lower
            .parse::<f64>()
            .map(NumberLit::Float)
            .map_err(|_| invalid());
    }

    if let Ok(v) = lower.parse::<i64>() {
        return Ok(NumberLit::Int(v));
    }
    if let Ok(v) = lower.parse::<u64>() {
        return Ok(NumberLit::Uint(v));
    }
    lower
        .parse::<f64>()
        .map(NumberLit::Float)
        .map_err(|_| invalid())
}

/// Decode a double-quoted or back-quoted string literal.
pub fn unquote(text: &str) -> Result<String, String> {
    if let Some(raw) = text.strip_prefix('`').and_then(|t| t.strip_suffix('`')) {
        return Ok(raw.to_string());
    }
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(|| format!("invalid quoted string: {text}"))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = chars
            .next()
            .ok_or_else(|| "unterminated escape sequence".to_string())?;
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'x' => out.push(hex_escape(&mut chars, 2)?),
            'u' => out.push(hex_escape(&mut chars, 4)?),
            'U' => out.push(hex_escape(&mut chars, 8)?),
            '0'..='7' => {
                let mut value = escaped.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    let digit = chars
                        .next()
                        .and_then(|d| d.to_digit(8))
                        .ok_or_else(|| "invalid octal escape".to_string())?;
                    value = value * 8 + digit;
                }
                let c = char::from_u32(value).ok_or_else(|| "invalid octal escape".to_string())?;
                out.push(c);
            }
            other => return Err(format!("unknown escape sequence: \\{other}")),
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, width: usize) -> Result<char, String> {
    let digits: String = chars.by_ref().take(width).collect();
    if digits.len() != width {
        return Err("invalid hex escape".to_string());
    }
    u32::from_str_radix(&digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| format!("invalid escape value: {digits}"))
}

/// Quote a string so that [`unquote`] returns it unchanged.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
