//! Lexer tests using rstest for parameterization.

use rstest::rstest;
use stencil_kernel::lexer::{tokenize, Delims, Token, TokenKind};

fn lex(source: &str) -> Vec<Token<'_>> {
    // The default delimiters are 'static, so tokens may outlive this frame.
    static DELIMS: std::sync::OnceLock<Delims> = std::sync::OnceLock::new();
    tokenize(source, DELIMS.get_or_init(Delims::default)).collect()
}

fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source).into_iter().map(|t| t.kind).collect()
}

/// Kinds inside the first action, spaces dropped.
fn action_kinds(source: &str) -> Vec<TokenKind> {
    lex(source)
        .into_iter()
        .map(|t| t.kind)
        .skip_while(|k| *k != TokenKind::LeftDelim)
        .skip(1)
        .take_while(|k| *k != TokenKind::RightDelim)
        .filter(|k| *k != TokenKind::Space)
        .collect()
}

use TokenKind::*;

// =============================================================================
// TEXT AND DELIMITERS
// =============================================================================

#[test]
fn text_and_field() {
    let tokens = lex("Hello {{ .Name }}!");
    let summary: Vec<(TokenKind, &str)> = tokens.iter().map(|t| (t.kind, t.text.as_ref())).collect();
    assert_eq!(
        summary,
        vec![
            (Text, "Hello "),
            (LeftDelim, "{{"),
            (Space, " "),
            (Field, ".Name"),
            (Space, " "),
            (RightDelim, "}}"),
            (Text, "!"),
        ]
    );
}

#[test]
fn trim_markers_eat_surrounding_whitespace() {
    let tokens = lex("a  {{- x -}}  b");
    let texts: Vec<&str> = tokens
        .iter()
        .filter(|t| t.kind == Text)
        .map(|t| t.text.as_ref())
        .collect();
    assert_eq!(texts, vec!["a", "b"]);
    assert_eq!(
        kinds("a  {{- x -}}  b"),
        vec![Text, LeftDelim, Space, Ident, RightDelim, Text]
    );
}

#[test]
fn comments_produce_no_tokens() {
    let tokens = lex("a{{* a {{ note }} *}}b");
    let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_ref()).collect();
    assert_eq!(texts, vec!["a", "b"]);
}

#[test]
fn custom_delimiters_leave_default_ones_as_text() {
    let delims = Delims::new("[[", "]]");
    let kinds: Vec<TokenKind> = tokenize("a [[ x ]] {{ y }}", &delims).map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![Text, LeftDelim, Space, Ident, Space, RightDelim, Text]
    );
}

#[test]
fn positions_track_lines() {
    let tokens = lex("a\n\n{{ x }}");
    let ident = tokens.iter().find(|t| t.kind == Ident).unwrap();
    assert_eq!(ident.line(), 3);
    assert_eq!(ident.pos.offset, 6);
}

// =============================================================================
// INSIDE ACTIONS
// =============================================================================

#[rstest]
#[case::keyword("{{ if }}", vec![If])]
#[case::keyword_prefix("{{ iffy }}", vec![Ident])]
#[case::declare("{{ x := 1 }}", vec![Ident, Declare, Number])]
#[case::assign("{{ x = nil }}", vec![Ident, Assign, Nil])]
#[case::dot("{{ . }}", vec![Dot])]
#[case::lax_field("{{ ?.Maybe }}", vec![LaxField])]
#[case::lax_index("{{ m?[1] }}", vec![Ident, LaxIndex, Number, RBracket])]
#[case::comparison("{{ a >= b != c }}", vec![Ident, GreaterEquals, Ident, NotEquals, Ident])]
#[case::logic("{{ a && !b || c }}", vec![Ident, AndAnd, Bang, Ident, OrOr, Ident])]
#[case::word_logic("{{ a and not b or c }}", vec![Ident, And, Not, Ident, Or, Ident])]
#[case::pipeline("{{ x | f: 1, _ }}", vec![Ident, Pipe, Ident, Colon, Number, Comma, Underscore])]
#[case::strings("{{ \"a\\\"b\" `raw` }}", vec![String, RawString])]
#[case::bools("{{ true false }}", vec![Bool, Bool])]
#[case::block("{{ block b(x=1) }}", vec![Block, Ident, LParen, Ident, Assign, Number, RParen])]
#[case::yield_content("{{ yield content }}", vec![Yield, Content])]
#[case::ternary("{{ a ? 1 : 2 }}", vec![Ident, Question, Number, Colon, Number])]
fn action_tokens(#[case] source: &str, #[case] expected: Vec<TokenKind>) {
    assert_eq!(action_kinds(source), expected);
}

#[rstest]
#[case("{{ 42 }}")]
#[case("{{ 0x1F }}")]
#[case("{{ 0o17 }}")]
#[case("{{ 0b101 }}")]
#[case("{{ 1_000_000 }}")]
#[case("{{ 3.25 }}")]
#[case("{{ 1e3 }}")]
fn numerals(#[case] source: &str) {
    assert_eq!(action_kinds(source), vec![Number]);
}

// =============================================================================
// ERRORS
// =============================================================================

#[rstest]
#[case::unterminated_string("{{ \"abc }}", "unterminated quoted string")]
#[case::unterminated_raw("{{ `abc }}", "unterminated raw quoted string")]
#[case::unclosed_action("{{ x ", "unclosed action")]
#[case::unclosed_comment("a {{* never closed", "unclosed comment")]
fn lexical_errors(#[case] source: &str, #[case] message: &str) {
    let tokens = lex(source);
    let last = tokens.last().unwrap();
    assert_eq!(last.kind, Error, "tokens: {tokens:?}");
    assert!(last.text.contains(message), "got {:?}", last.text);
}

#[test]
fn nothing_follows_an_error() {
    let delims = Delims::default();
    let mut lexer = tokenize("{{ @ }} more {{ x }}", &delims);
    let mut saw_error = false;
    for _ in 0..10 {
        let tok = lexer.next_token();
        if saw_error {
            assert_eq!(tok.kind, Eof);
        }
        saw_error |= tok.kind == Error;
    }
    assert!(saw_error);
}
