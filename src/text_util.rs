/// Default number of lines in a snippet when no match is found.
pub const DEFAULT_SNIPPET_LINES: usize = 3;

/// Maximum number of characters in a snippet before truncation.
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 300;

/// Remove HTML tags and comments from page contents, leaving the text
/// between them. Markdown syntax itself is left alone.
///
/// A `<` that does not open a tag (`a < b`, `<3`) is kept. An unclosed
/// comment or tag swallows the rest of the input.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('<') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(comment) = tail.strip_prefix("<!--") {
            rest = match comment.find("-->") {
                Some(end) => &comment[end + 3..],
                None => "",
            };
            continue;
        }

        // A `<` with no closing `>` is text, not a tag.
        match tail.find('>').filter(|_| opens_tag(&tail[1..])) {
            Some(end) => {
                rest = &tail[end + 1..];
                // Keep words on either side of a tag apart.
                if !out.ends_with(char::is_whitespace) && !out.is_empty() {
                    out.push(' ');
                }
            }
            None => {
                out.push('<');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn opens_tag(after_lt: &str) -> bool {
    let after_lt = after_lt.strip_prefix('/').unwrap_or(after_lt);
    after_lt
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '!')
}

/// Extract a snippet around the first line containing `term`
/// (case-insensitive). If `term` is empty or not found, returns the first few
/// lines. Returns `None` if the text is empty.
pub fn extract_snippet(text: &str, term: &str) -> Option<String> {
    let lines: Vec<&str> =
        text.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }

    let term_lower = term.to_lowercase();
    let match_idx = if term_lower.is_empty() {
        None
    } else {
        lines
            .iter()
            .position(|line| line.to_lowercase().contains(&term_lower))
    };

    let (start, end) = match match_idx {
        Some(idx) => (idx.saturating_sub(1), (idx + 2).min(lines.len())),
        None => (0, DEFAULT_SNIPPET_LINES.min(lines.len())),
    };

    let snippet = lines[start..end].join("\n");
    Some(truncate_chars(snippet, DEFAULT_SNIPPET_MAX_CHARS))
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((byte_idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_idx);
        text.push_str("...");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_markup_removes_tags_and_comments() {
        let html = "<p>Hello <b>world</b></p><!-- hidden -->\n# Title";
        assert_eq!(strip_markup(html), "Hello world \n# Title");
    }

    #[test]
    fn strip_markup_keeps_plain_angle_brackets() {
        assert_eq!(strip_markup("a < b and 1<3"), "a < b and 1<3");
        assert_eq!(strip_markup("x <- y"), "x <- y");
    }

    #[test]
    fn strip_markup_separates_words_around_tags() {
        let html = "before<script src=\"x.js\"></script>after";
        assert_eq!(strip_markup(html), "before after");
    }

    #[test]
    fn strip_markup_unclosed_comment() {
        assert_eq!(strip_markup("keep <!-- lost"), "keep ");
    }

    #[test]
    fn strip_markup_keeps_text_after_unclosed_tag() {
        assert_eq!(
            strip_markup("if a<b then zebrafish swim"),
            "if a<b then zebrafish swim"
        );
        assert_eq!(strip_markup("x <b>y</b> z<w"), "x y  z<w");
    }

    #[test]
    fn strip_markup_plain_markdown_untouched() {
        let md = "# Heading\n\n- item\n- [link](http://x)\n";
        assert_eq!(strip_markup(md), md);
    }

    #[test]
    fn extract_snippet_match_found() {
        let text = "line1\nline2\nline3\nrust is great\nline5\nline6";
        let snippet = extract_snippet(text, "Rust").unwrap();
        assert_eq!(snippet, "line3\nrust is great\nline5");
    }

    #[test]
    fn extract_snippet_no_match_returns_head() {
        let text = "line1\nline2\nline3\nline4";
        let snippet = extract_snippet(text, "zzz").unwrap();
        assert_eq!(snippet, "line1\nline2\nline3");
        assert_eq!(extract_snippet(text, "").unwrap(), snippet);
    }

    #[test]
    fn extract_snippet_empty_text() {
        assert!(extract_snippet("", "query").is_none());
        assert!(extract_snippet("\n  \n", "query").is_none());
    }

    #[test]
    fn extract_snippet_truncates_on_char_boundary() {
        let text = "é".repeat(500);
        let snippet = extract_snippet(&text, "é").unwrap();
        assert_eq!(
            snippet.chars().count(),
            DEFAULT_SNIPPET_MAX_CHARS + "...".len()
        );
        assert!(snippet.ends_with("..."));
    }
}
