//! XML sanitation and repair for malformed upstream responses.
//!
//! Some OAI-PMH endpoints serve XML with control characters or bare `&`
//! characters that break strict parsers. Cleaning happens before every
//! parse attempt; the ampersand repair runs exactly once, and if the
//! repaired text still does not parse the response is dumped to disk
//! for diagnosis and the harvest aborts.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use roxmltree::Document;

use crate::error::{HarvesterError, Result};

/// Characters invalid in XML 1.0: 0x00-0x08, 0x0B, 0x0C, 0x0E-0x1F.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static INVALID_XML_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").expect("valid regex"));

/// Remove control characters that are invalid in XML 1.0.
pub fn strip_control_chars(text: &str) -> String {
    INVALID_XML_CHARS.replace_all(text, "").into_owned()
}

/// Escape every `&` that does not open a valid entity reference.
///
/// An entity reference here is `&` followed by `[A-Za-z#][A-Za-z0-9]*;`,
/// which covers named entities (`&amp;`) and numeric ones (`&#38;`).
///
/// # Examples
/// ```
/// use oai_harvester::sanitize::escape_bare_ampersands;
///
/// assert_eq!(escape_bare_ampersands("A&B"), "A&amp;B");
/// assert_eq!(escape_bare_ampersands("A&amp;B"), "A&amp;B");
/// ```
pub fn escape_bare_ampersands(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.char_indices() {
        if ch == '&' && !opens_entity(&bytes[i + 1..]) {
            out.push_str("&amp;");
        } else {
            out.push(ch);
        }
    }
    out
}

/// Whether the bytes after a `&` form `[A-Za-z#][A-Za-z0-9]*;`.
fn opens_entity(rest: &[u8]) -> bool {
    let mut iter = rest.iter();
    match iter.next() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'#' => {}
        _ => return false,
    }
    for b in iter {
        match b {
            b';' => return true,
            b if b.is_ascii_alphanumeric() => continue,
            _ => return false,
        }
    }
    false
}

/// Clean a raw response body and return text that is guaranteed to parse.
///
/// Control characters are stripped first. If the cleaned text fails to
/// parse, one repair pass escapes bare ampersands and parsing is retried.
/// If that also fails, the *pre-repair* cleaned text is written to
/// `dump_path` and a terminal [`HarvesterError::MalformedXml`] is
/// returned. This failure is not retried: it indicates persistently
/// malformed upstream content, not a transient fault.
pub fn sanitize_for_parse(raw: &str, dump_path: &Path) -> Result<String> {
    let cleaned = strip_control_chars(raw);
    if Document::parse(&cleaned).is_ok() {
        return Ok(cleaned);
    }

    let repaired = escape_bare_ampersands(&cleaned);
    match Document::parse(&repaired) {
        Ok(_) => {
            tracing::warn!("repaired malformed XML: escaped bare '&' characters");
            Ok(repaired)
        }
        Err(source) => {
            fs::write(dump_path, &cleaned)?;
            Err(HarvesterError::MalformedXml {
                source,
                dump_path: dump_path.to_path_buf(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_control_chars() {
        assert_eq!(strip_control_chars("a\u{0}b\u{8}c"), "abc");
        assert_eq!(strip_control_chars("a\u{b}\u{c}b"), "ab");
        assert_eq!(strip_control_chars("a\u{1f}b"), "ab");
        // Tab, newline and carriage return are valid XML whitespace
        assert_eq!(strip_control_chars("a\tb\nc\rd"), "a\tb\nc\rd");
    }

    #[test]
    fn test_escape_bare_ampersands() {
        assert_eq!(escape_bare_ampersands("Tom & Jerry"), "Tom &amp; Jerry");
        assert_eq!(escape_bare_ampersands("x&"), "x&amp;");
        assert_eq!(escape_bare_ampersands("&&"), "&amp;&amp;");
    }

    #[test]
    fn test_escape_preserves_valid_entities() {
        assert_eq!(escape_bare_ampersands("&amp;"), "&amp;");
        assert_eq!(escape_bare_ampersands("&lt;tag&gt;"), "&lt;tag&gt;");
        assert_eq!(escape_bare_ampersands("&#38;"), "&#38;");
        assert_eq!(escape_bare_ampersands("&#x26;"), "&#x26;");
    }

    #[test]
    fn test_escape_ampersand_without_semicolon() {
        // Looks like an entity but never terminates
        assert_eq!(escape_bare_ampersands("a&bcd efg"), "a&amp;bcd efg");
    }

    #[test]
    fn test_sanitize_clean_input_passes_through() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("dump.xml");

        let text = sanitize_for_parse("<root><a>1</a></root>", &dump).unwrap();
        assert_eq!(text, "<root><a>1</a></root>");
        assert!(!dump.exists());
    }

    #[test]
    fn test_sanitize_repairs_bare_ampersand() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("dump.xml");

        let text = sanitize_for_parse("<root>Tom & Jerry</root>", &dump).unwrap();
        assert_eq!(text, "<root>Tom &amp; Jerry</root>");
        assert!(roxmltree::Document::parse(&text).is_ok());
        assert!(!dump.exists());
    }

    #[test]
    fn test_sanitize_dumps_unrepairable_input() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("dump.xml");

        let err = sanitize_for_parse("<root><unclosed>", &dump).unwrap_err();
        assert!(matches!(err, HarvesterError::MalformedXml { .. }));
        // The pre-repair cleaned text is preserved for diagnosis
        assert_eq!(std::fs::read_to_string(&dump).unwrap(), "<root><unclosed>");
    }

    #[test]
    fn test_repair_round_trip_only_touches_bare_ampersands() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("dump.xml");

        let raw = "<root><title>Arts &amp; Crafts</title><note>Q&A</note></root>";
        let text = sanitize_for_parse(raw, &dump).unwrap();
        assert_eq!(
            text,
            "<root><title>Arts &amp; Crafts</title><note>Q&amp;A</note></root>"
        );
    }
}
