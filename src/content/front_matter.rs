//! Metadata extraction for Markdown and elm-markup sources.
//!
//! # Markdown
//!
//! ```text
//! ---
//! title: "Hello"
//! tags: tech life
//! ---
//! Body text
//! ```
//!
//! # elm-markup
//!
//! ```text
//! |> Metadata
//!     title = Hello
//!     tags = tech life
//!
//! Body text
//! ```

use regex::Regex;
use std::sync::LazyLock;

const PREAMBLE_MARKER: &str = "---\n";

/// Raw `key`/`value` pairs in declaration order.
pub type Pairs = Vec<(String, String)>;

/// Split a Markdown source into its preamble pairs and body.
///
/// Without an opening `---` line, or without a later closing one, the whole
/// file is body.
pub fn split_markdown(contents: &str) -> (Pairs, &str) {
    let Some(rest) = contents.strip_prefix(PREAMBLE_MARKER) else {
        return (Vec::new(), contents);
    };

    // An empty preamble closes immediately
    if let Some(body) = rest.strip_prefix(PREAMBLE_MARKER) {
        return (Vec::new(), body);
    }

    match rest.find("\n---\n") {
        Some(end) => {
            let preamble = &rest[..end];
            let body = &rest[end + 1 + PREAMBLE_MARKER.len()..];
            (parse_preamble(preamble), body)
        }
        None => (Vec::new(), contents),
    }
}

/// `key: value` lines, split at the first `:`.
fn parse_preamble(preamble: &str) -> Pairs {
    preamble
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_owned(), value.trim().to_owned()))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Read the `|> Metadata` block of an elm-markup document.
///
/// The block ends at the first blank line after its header.
pub fn parse_elm_markup(contents: &str) -> Pairs {
    static HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\|>\s*Metadata\s*").unwrap());
    static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

    let Some(header) = HEADER.find(contents) else {
        return Vec::new();
    };
    let Some(blank) = BLANK_LINE.find_at(contents, header.start()) else {
        return Vec::new();
    };
    // The header's trailing whitespace swallowed the blank line: no entries
    if blank.start() < header.end() {
        return Vec::new();
    }

    contents[header.end()..blank.start()]
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_owned(), value.trim().to_owned()))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Strip one leading and one trailing double quote, independently.
pub fn unquote(s: &str) -> &str {
    let s = s.strip_prefix('"').unwrap_or(s);
    s.strip_suffix('"').unwrap_or(s)
}

/// Parse a tag list: `tech life` or `["tech", "life"]`.
pub fn parse_tags(value: &str) -> Vec<String> {
    let value = value.trim();
    let bracketed = value.strip_prefix('[').and_then(|v| v.strip_suffix(']'));

    match bracketed {
        Some(inner) => inner
            .split(',')
            .map(|tag| unquote(tag.trim()).trim())
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect(),
        None => value.split_whitespace().map(str::to_owned).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_owned(), v.to_owned())
    }

    #[test]
    fn test_split_markdown() {
        let (pairs, body) = split_markdown("---\ntitle: \"Hi\"\n\nnote: a: b\nnokey\n---\nBody\n");
        assert_eq!(pairs, vec![pair("title", "\"Hi\""), pair("note", "a: b")]);
        assert_eq!(body, "Body\n");
    }

    #[test]
    fn test_split_markdown_without_preamble() {
        let (pairs, body) = split_markdown("# Title\n---\nmore");
        assert!(pairs.is_empty());
        assert_eq!(body, "# Title\n---\nmore");
    }

    #[test]
    fn test_split_markdown_unclosed_preamble() {
        let source = "---\ntitle: x\nno end";
        let (pairs, body) = split_markdown(source);
        assert!(pairs.is_empty());
        assert_eq!(body, source);
    }

    #[test]
    fn test_split_markdown_empty_preamble() {
        let (pairs, body) = split_markdown("---\n---\nBody");
        assert!(pairs.is_empty());
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_parse_elm_markup() {
        let source = "|> Metadata\n    title = Hello\n    tags = tech life\n\n|> Section\n    x = y\n";
        assert_eq!(
            parse_elm_markup(source),
            vec![pair("title", "Hello"), pair("tags", "tech life")]
        );
    }

    #[test]
    fn test_parse_elm_markup_after_blank_line() {
        let source = "Intro\n\n|> Metadata\n    title = Late\n\nBody";
        assert_eq!(parse_elm_markup(source), vec![pair("title", "Late")]);
    }

    #[test]
    fn test_parse_elm_markup_without_metadata() {
        assert!(parse_elm_markup("|> Section\n    x = y\n\n").is_empty());
        assert!(parse_elm_markup("|> Metadata\n    title = no blank line").is_empty());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"Hello\""), "Hello");
        assert_eq!(unquote("\"Half"), "Half");
        assert_eq!(unquote("Plain"), "Plain");
        assert_eq!(unquote("\""), "");
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("tech  life\tmisc"), vec!["tech", "life", "misc"]);
        assert_eq!(parse_tags(r#"["tech", life , ""]"#), vec!["tech", "life"]);
        assert!(parse_tags("   ").is_empty());
    }
}
