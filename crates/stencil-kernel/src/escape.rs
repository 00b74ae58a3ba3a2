//! Output escaping.
//!
//! Every computed value a template prints passes through the set's
//! [`SafeWriter`]. The default escapes HTML; a set built without one writes
//! values verbatim. Safe writers registered as variables (`raw`, `safeHtml`)
//! take over the output of a pipeline directly.

use std::io::{self, Write};
use std::sync::Arc;

/// Writes computed output to the destination, transforming it on the way.
pub type SafeWriter = Arc<dyn Fn(&mut dyn Write, &[u8]) -> io::Result<()> + Send + Sync>;

const ESC_QUOT: &[u8] = b"&#34;";
const ESC_APOS: &[u8] = b"&#39;";
const ESC_AMP: &[u8] = b"&amp;";
const ESC_LT: &[u8] = b"&lt;";
const ESC_GT: &[u8] = b"&gt;";
const ESC_NUL: &[u8] = "\u{FFFD}".as_bytes();

/// Write `bytes` with HTML special characters replaced by entities.
pub fn write_html_escaped(w: &mut dyn Write, bytes: &[u8]) -> io::Result<()> {
    let mut last = 0;
    for (i, b) in bytes.iter().enumerate() {
        let replacement = match b {
            b'"' => ESC_QUOT,
            b'\'' => ESC_APOS,
            b'&' => ESC_AMP,
            b'<' => ESC_LT,
            b'>' => ESC_GT,
            0 => ESC_NUL,
            _ => continue,
        };
        w.write_all(&bytes[last..i])?;
        w.write_all(replacement)?;
        last = i + 1;
    }
    w.write_all(&bytes[last..])
}

/// HTML-escape a string.
pub fn escape_html(text: &str) -> String {
    let mut out = Vec::with_capacity(text.len());
    // Writing into a Vec cannot fail.
    let _ = write_html_escaped(&mut out, text.as_bytes());
    String::from_utf8_lossy(&out).into_owned()
}

/// The default escaper.
pub fn html_escaper() -> SafeWriter {
    Arc::new(write_html_escaped)
}

/// Writes bytes unchanged.
pub fn raw_writer() -> SafeWriter {
    Arc::new(|w: &mut dyn Write, bytes: &[u8]| w.write_all(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("plain", "plain")]
    #[case("<b>\"hi\" & 'bye'</b>", "&lt;b&gt;&#34;hi&#34; &amp; &#39;bye&#39;&lt;/b&gt;")]
    #[case("a\0b", "a\u{FFFD}b")]
    #[case("", "")]
    fn html_escaping(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_html(input), expected);
    }

    #[test]
    fn raw_writer_is_verbatim() {
        let mut out = Vec::new();
        raw_writer()(&mut out, b"<b>").unwrap();
        assert_eq!(out, b"<b>");
    }
}
