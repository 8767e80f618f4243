//! Text utilities used by the code generators.
//!
//! Escaping for JS string literals and JSON payloads, identifier and
//! attribute-name checks, and the simple split helpers.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::string::FromUtf8Error;

lazy_static! {
    static ref JS_IDENTIFIER_RE: Regex = Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]*$").unwrap();
    static ref ATTRIBUTE_NAME_RE: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_-]*$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// ESCAPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Escape text for use inside a single- or double-quoted JS string literal.
///
/// Line terminators collapse to `\n`, NUL is dropped, and HTML comment
/// delimiters are encoded so the literal can be inlined in a `<script>`.
pub fn escape_for_javascript_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut rest = input;
    while let Some(c) = rest.chars().next() {
        if rest.starts_with("<!--") {
            out.push_str("\\u003C\\u0021--");
            rest = &rest[4..];
            continue;
        }
        if rest.starts_with("-->") {
            out.push_str("--\\u003E");
            rest = &rest[3..];
            continue;
        }
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\r' => out.push_str("\\r"),
            '\n' | '\u{2028}' | '\u{2029}' => out.push_str("\\n"),
            '\0' => {}
            _ => out.push(c),
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Pre-pass applied to text before it is embedded into a JSON string.
pub fn escape_for_json_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\u{2028}' | '\u{2029}' => out.push('\n'),
            '\0' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Escape JS source for embedding as a raw function body inside a JSON
/// payload that itself sits in a block comment-sensitive context.
pub fn escape_for_json_function(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'/') => out.push_str("\\u002A"),
            '\u{2028}' => out.push('\n'),
            '\u{2029}' => out.push_str("\\u2029"),
            '\0' => {}
            _ => out.push(c),
        }
    }
    out
}

/// A `fmt::Write` adapter applying `escape_for_json_function` to everything
/// written through it. A `*` at the end of a chunk is held back until the
/// next chunk shows whether it closes a comment.
pub struct JsonEscapedFunctionWriter<W: fmt::Write> {
    inner: W,
    pending_star: bool,
}

impl<W: fmt::Write> JsonEscapedFunctionWriter<W> {
    pub fn new(inner: W) -> Self {
        JsonEscapedFunctionWriter {
            inner,
            pending_star: false,
        }
    }

    /// Flush any held-back character and return the wrapped writer.
    pub fn finish(mut self) -> Result<W, fmt::Error> {
        if self.pending_star {
            self.inner.write_char('*')?;
        }
        Ok(self.inner)
    }
}

impl<W: fmt::Write> fmt::Write for JsonEscapedFunctionWriter<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if s.is_empty() {
            return Ok(());
        }
        let mut chunk = String::with_capacity(s.len() + 1);
        if self.pending_star {
            chunk.push('*');
            self.pending_star = false;
        }
        chunk.push_str(s);
        if chunk.ends_with('*') {
            chunk.pop();
            self.pending_star = true;
        }
        self.inner.write_str(&escape_for_json_function(&chunk))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// True for plain identifiers usable with dot access (`$cmp.name`).
pub fn is_valid_js_identifier(s: &str) -> bool {
    JS_IDENTIFIER_RE.is_match(s)
}

/// Markup attribute names: a letter or underscore, then letters, digits,
/// `-` or `_`.
pub fn validate_attribute_name(name: &str) -> bool {
    ATTRIBUTE_NAME_RE.is_match(name)
}

pub fn is_null_or_empty(s: Option<&str>) -> bool {
    s.map_or(true, str::is_empty)
}

/// Control characters count as whitespace here, `None` does not.
pub fn is_empty_or_whitespace(s: Option<&str>) -> bool {
    match s {
        Some(s) => s.chars().all(|c| c <= ' '),
        None => false,
    }
}

/// Same multiset of characters, in any order.
pub fn strings_have_same_content(a: &str, b: &str) -> bool {
    let mut a: Vec<char> = a.chars().collect();
    let mut b: Vec<char> = b.chars().collect();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

// ═══════════════════════════════════════════════════════════════════════════════
// CASE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn init_lower_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn init_cap(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `record-id` -> `recordId`. Separators other than `-` are treated the same
/// way, so `x/test` -> `xTest`.
pub fn dashed_to_camel_case(s: &str) -> String {
    let mut parts = s
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .filter(|p| !p.is_empty());
    let mut out = match parts.next() {
        Some(first) => first.to_string(),
        None => return String::new(),
    };
    for part in parts {
        out.push_str(&init_cap(part));
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// URL ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Form-style URL encoding: UTF-8 percent escapes, space as `+`.
pub fn url_encode(input: &str) -> String {
    urlencoding::encode(input).replace("%20", "+")
}

/// Inverse of [`url_encode`]; `+` decodes to a space. Fails when the
/// escapes do not form valid UTF-8.
pub fn url_decode(input: &str) -> Result<String, FromUtf8Error> {
    let spaced = input.replace('+', " ");
    urlencoding::decode(&spaced).map(|decoded| decoded.into_owned())
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOINING & SPLITTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Join at most `limit` items (all when `None`), optionally wrapping in
/// brackets and marking truncation with `...`. Missing items render as
/// `null`.
pub fn array_to_string(
    items: &[Option<&str>],
    delimiter: &str,
    limit: Option<usize>,
    brackets: bool,
    ellipsis: bool,
) -> String {
    let take = limit.unwrap_or(items.len()).min(items.len());
    let mut out = String::new();
    if brackets {
        out.push('[');
    }
    for (i, item) in items.iter().take(take).enumerate() {
        if i > 0 {
            out.push_str(delimiter);
        }
        out.push_str(item.unwrap_or("null"));
    }
    if ellipsis && take < items.len() {
        out.push_str("...");
    }
    if brackets {
        out.push(']');
    }
    out
}

pub fn split_simple(input: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return vec![input.to_string()];
    }
    input.split(delimiter).map(str::to_string).collect()
}

pub fn split_simple_and_trim(input: &str, delimiter: &str) -> Vec<String> {
    split_simple(input, delimiter)
        .into_iter()
        .map(|s| s.trim().to_string())
        .collect()
}

/// Split into at most `limit` parts; the last part keeps the remainder.
pub fn split_simple_limit(input: &str, delimiter: &str, limit: usize) -> Vec<String> {
    if delimiter.is_empty() || limit <= 1 {
        return vec![input.to_string()];
    }
    input.splitn(limit, delimiter).map(str::to_string).collect()
}

pub fn split_simple_limit_and_trim(input: &str, delimiter: &str, limit: usize) -> Vec<String> {
    split_simple_limit(input, delimiter, limit)
        .into_iter()
        .map(|s| s.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_init_lower_case() {
        let pairs = [
            ("", ""),
            ("A", "a"),
            ("a", "a"),
            ("Apple", "apple"),
            ("1", "1"),
            ("=", "="),
            (" A", " A"),
            ("Ñ", "ñ"),
        ];
        for (input, expected) in pairs {
            assert_eq!(init_lower_case(input), expected);
        }
    }

    #[test]
    fn test_init_cap() {
        let pairs = [
            ("", ""),
            ("a", "A"),
            ("Apple", "Apple"),
            ("apple", "Apple"),
            (" a", " a"),
            ("ñ", "Ñ"),
        ];
        for (input, expected) in pairs {
            assert_eq!(init_cap(input), expected);
        }
    }

    #[test]
    fn test_dashed_to_camel_case() {
        assert_eq!(dashed_to_camel_case("record-id"), "recordId");
        assert_eq!(dashed_to_camel_case("x/test"), "xTest");
        assert_eq!(dashed_to_camel_case("lwc"), "lwc");
        assert_eq!(dashed_to_camel_case("@salesforce/apex"), "salesforceApex");
    }

    #[test]
    fn test_array_to_string() {
        assert_eq!(array_to_string(&[], ",", Some(1), false, false), "");
        assert_eq!(array_to_string(&[], ",", Some(1), true, false), "[]");
        assert_eq!(array_to_string(&[Some("1")], ",", Some(1), true, true), "[1]");
        let three = [Some("1"), Some("2"), Some("3")];
        assert_eq!(array_to_string(&three, ",", Some(2), false, false), "1,2");
        assert_eq!(array_to_string(&three, ",", Some(2), false, true), "1,2...");
        assert_eq!(array_to_string(&three, "xxx", Some(2), true, true), "[1xxx2...]");
        assert_eq!(array_to_string(&[Some("1"), None], ",", Some(2), false, false), "1,null");
        let four = [Some("1"), Some("2"), Some("3"), Some("4")];
        assert_eq!(array_to_string(&four, ",", None, false, false), "1,2,3,4");
    }

    #[test]
    fn test_null_and_whitespace_predicates() {
        assert!(is_null_or_empty(None));
        assert!(is_null_or_empty(Some("")));
        assert!(!is_null_or_empty(Some(" ")));
        assert!(!is_null_or_empty(Some("\t\n a")));

        assert!(!is_empty_or_whitespace(None));
        assert!(is_empty_or_whitespace(Some("")));
        assert!(is_empty_or_whitespace(Some("\r\n ")));
        assert!(is_empty_or_whitespace(Some(
            "\u{1}\u{2}\u{3}\u{4}\u{5}\u{6}\u{7}\u{8}\u{9}\u{10}\u{11} "
        )));
        assert!(!is_empty_or_whitespace(Some("\t\n a")));
        assert!(!is_empty_or_whitespace(Some("\u{fffe}")));
    }

    #[test]
    fn test_escape_for_javascript_string() {
        let pairs = [
            ("'", "\\'"),
            ("\r", "\\r"),
            ("\n", "\\n"),
            ("\u{2028}", "\\n"),
            ("'abc'", "\\'abc\\'"),
            ("<!--", "\\u003C\\u0021--"),
            ("-->", "--\\u003E"),
            ("\"", "\\\""),
            ("\\", "\\\\"),
            ("\0", ""),
        ];
        for (input, expected) in pairs {
            assert_eq!(escape_for_javascript_string(input), expected, "input {:?}", input);
        }
        let plain = "0123456789/!@#$%^&*()-_abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
        assert_eq!(escape_for_javascript_string(plain), plain);
    }

    #[test]
    fn test_escape_for_json_string() {
        assert_eq!(escape_for_json_string("\u{2028}"), "\n");
        assert_eq!(escape_for_json_string("\0"), "");
        let plain = "0123456789/!@#$%^&*()-_abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
        assert_eq!(escape_for_json_string(plain), plain);
    }

    #[test]
    fn test_escape_for_json_function() {
        assert_eq!(escape_for_json_function(""), "");
        assert_eq!(escape_for_json_function("\u{2029}"), "\\u2029");
        assert_eq!(escape_for_json_function("\u{2028}"), "\n");
        assert_eq!(escape_for_json_function("\0"), "");
        assert_eq!(escape_for_json_function("*/"), "\\u002A/");
    }

    #[test]
    fn test_json_escaped_function_writer() {
        let mut writer = JsonEscapedFunctionWriter::new(String::new());
        writer.write_str("/* */").unwrap();
        assert_eq!(writer.finish().unwrap(), "/* \\u002A/");

        // Comment terminator split across two writes
        let mut writer = JsonEscapedFunctionWriter::new(String::new());
        writer.write_str("/* a *").unwrap();
        writer.write_str("/ b").unwrap();
        assert_eq!(writer.finish().unwrap(), "/* a \\u002A/ b");

        let mut writer = JsonEscapedFunctionWriter::new(String::new());
        write!(writer, "a * b *").unwrap();
        assert_eq!(writer.finish().unwrap(), "a * b *");
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode(""), "");
        assert_eq!(url_encode("a b&c=d"), "a+b%26c%3Dd");
        assert_eq!(url_encode("x/foo.js?v=1"), "x%2Ffoo.js%3Fv%3D1");
        assert_eq!(url_encode("ñ"), "%C3%B1");
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("").unwrap(), "");
        assert_eq!(url_decode("a+b%26c%3Dd").unwrap(), "a b&c=d");
        assert_eq!(url_decode("%C3%B1").unwrap(), "ñ");
        assert_eq!(url_decode("a%20b").unwrap(), "a b");
        assert!(url_decode("%FF").is_err());
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(split_simple("", ","), vec![""]);
        assert_eq!(split_simple("a", ","), vec!["a"]);
        assert_eq!(split_simple("a,b", ","), vec!["a", "b"]);
        assert_eq!(split_simple("axxxb", "xxx"), vec!["a", "b"]);
        assert_eq!(split_simple("a, b", ","), vec!["a", " b"]);
        assert_eq!(split_simple("a,b,", ","), vec!["a", "b", ""]);

        let mut result = split_simple("a,b", ",");
        result.pop();
        assert_eq!(result, vec!["a"]);
    }

    #[test]
    fn test_split_simple_and_trim() {
        assert_eq!(split_simple_and_trim("a, b", ","), vec!["a", "b"]);
        assert_eq!(split_simple_and_trim("a,b ", ","), vec!["a", "b"]);
        assert_eq!(split_simple_and_trim("a,b,  ", ","), vec!["a", "b", ""]);
    }

    #[test]
    fn test_split_simple_limit() {
        assert_eq!(split_simple_limit("a,b", ",", 1), vec!["a,b"]);
        assert_eq!(split_simple_limit("axxxb", "xxx", 2), vec!["a", "b"]);
        assert_eq!(split_simple_limit("axxxbxxxc", "xxx", 2), vec!["a", "bxxxc"]);
        assert_eq!(split_simple_limit("a,b,", ",", 2), vec!["a", "b,"]);
        assert_eq!(split_simple_limit("a,b,", ",", 10), vec!["a", "b", ""]);
    }

    #[test]
    fn test_split_simple_limit_and_trim() {
        assert_eq!(split_simple_limit_and_trim("", ",", 1), vec![""]);
        assert_eq!(split_simple_limit_and_trim("a   ", ",", 1), vec!["a"]);
        assert_eq!(split_simple_limit_and_trim("axxx b", "xxx", 2), vec!["a", "b"]);
        assert_eq!(split_simple_limit_and_trim("axxxbxxx c", "xxx", 2), vec!["a", "bxxx c"]);
        assert_eq!(split_simple_limit_and_trim("a,b,   ", ",", 2), vec!["a", "b,"]);
        assert_eq!(split_simple_limit_and_trim("a,b,   ", ",", 10), vec!["a", "b", ""]);
    }

    #[test]
    fn test_validate_attribute_name() {
        assert!(validate_attribute_name("name"));
        assert!(validate_attribute_name("_name"));
        assert!(validate_attribute_name("na-me"));
        assert!(validate_attribute_name("na_me"));
        assert!(validate_attribute_name("nam123e"));
        assert!(!validate_attribute_name("na$:me"));
        assert!(!validate_attribute_name("123name"));
        assert!(!validate_attribute_name("nam e"));
        assert!(!validate_attribute_name("nam'a'e"));
    }

    #[test]
    fn test_strings_have_same_content() {
        assert!(strings_have_same_content("abc", "abc"));
        assert!(strings_have_same_content("abc", "cba"));
        assert!(!strings_have_same_content("abc", "def"));
    }

    #[test]
    fn test_is_valid_js_identifier() {
        for ok in ["variable", "$", "$$", "_", "_$_1A23$_a2Bc"] {
            assert!(is_valid_js_identifier(ok), "{} should be valid", ok);
        }
        for bad in ["{}", "function() {}", "", "1abc"] {
            assert!(!is_valid_js_identifier(bad), "{} should be invalid", bad);
        }
    }
}
