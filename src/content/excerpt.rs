//! Plain-text excerpts from Markdown bodies.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum excerpt length in characters, before the ellipsis
pub const EXCERPT_LEN: usize = 500;

/// (pattern, replacement) pairs applied in order.
static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // Fenced code markers (the code itself is kept)
        (r"(?m)^[ \t]*(```|~~~).*$\n?", ""),
        // Horizontal rules
        (r"(?m)^[ \t]*([-*_][ \t]*){3,}$", ""),
        // Setext heading underlines
        (r"(?m)^[=-]{2,}[ \t]*$", ""),
        // HTML tags
        (r"<[^>]*>", ""),
        // Reference definitions
        (r"(?m)^[ \t]*\[[^\]]*\]:.*$", ""),
        // Images, then links
        (r"!\[([^\]]*)\]\([^)]*\)", "$1"),
        (r"\[([^\]]*)\]\([^)]*\)", "$1"),
        (r"\[([^\]]*)\]\[[^\]]*\]", "$1"),
        // ATX headings
        (r"(?m)^[ \t]*#{1,6}[ \t]*", ""),
        // Blockquotes
        (r"(?m)^[ \t]*>[ \t]?", ""),
        // List markers
        (r"(?m)^[ \t]*([-*+]|\d+\.)[ \t]+", ""),
        // Emphasis and strikethrough
        (r"\*{1,3}(\S(?:.*?\S)?)\*{1,3}", "$1"),
        (r"\b_{1,3}(\S(?:.*?\S)?)_{1,3}\b", "$1"),
        (r"~~(\S(?:.*?\S)?)~~", "$1"),
        // Inline code
        (r"`([^`]*)`", "$1"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

/// Strip Markdown structure, leaving the readable text.
pub fn strip_markdown(markdown: &str) -> String {
    RULES
        .iter()
        .fold(markdown.to_owned(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
}

/// The first [`EXCERPT_LEN`] characters of the stripped text, plus `...`.
pub fn excerpt(markdown: &str) -> String {
    let mut excerpt: String = strip_markdown(markdown).chars().take(EXCERPT_LEN).collect();
    excerpt.push_str("...");
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markdown() {
        let text = "# Title\n\nSome **bold** and _em_ with [a link](http://x.y) and `code`.\n\n> quoted\n\n- item\n1. first\n";
        assert_eq!(
            strip_markdown(text),
            "Title\n\nSome bold and em with a link and code.\n\nquoted\n\nitem\nfirst\n"
        );
    }

    #[test]
    fn test_strip_html_and_images() {
        assert_eq!(strip_markdown("<div>hi</div> ![alt](a.png)"), "hi alt");
    }

    #[test]
    fn test_excerpt_truncates_by_chars() {
        let body = "é".repeat(600);
        let excerpt = excerpt(&body);
        assert_eq!(excerpt.chars().count(), EXCERPT_LEN + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_excerpt_short_body() {
        assert_eq!(excerpt("Short."), "Short....");
        assert_eq!(excerpt(""), "...");
    }
}
