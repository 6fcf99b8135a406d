//! Cleanup pipeline for scraped text.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! The output is prompt-ready prose: no markup noise, no link targets,
//! single spaces and at most one blank line between paragraphs.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on scraped text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = text.replace("\r\n", "\n");

    result = strip_html_tags(&result);
    result = strip_images(&result);
    result = unwrap_links(&result);
    result = decode_entities(&result);
    result = collapse_inline_whitespace(&result);
    result = collapse_blank_lines(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Strip leftover HTML tags
// ---------------------------------------------------------------------------

/// Remove any tag that survived conversion, keeping its inner text.
fn strip_html_tags(text: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"));

    HTML_TAG_RE.replace_all(text, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Images and links
// ---------------------------------------------------------------------------

fn strip_images(text: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    IMAGE_RE.replace_all(text, "").to_string()
}

/// `[text](url)` becomes `text`.
fn unwrap_links(text: &str) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));

    LINK_RE.replace_all(text, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Entities
// ---------------------------------------------------------------------------

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Pass 4: Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of spaces and tabs inside each line.
fn collapse_inline_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of blank lines into a single blank line.
fn collapse_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_tags_keeps_inner_text() {
        let input = "<div class=\"note\">Important <b>info</b></div>";
        assert_eq!(strip_html_tags(input), "Important info");
    }

    #[test]
    fn comparison_signs_survive() {
        let input = "COP < 3 is poor, COP > 4 is good";
        assert_eq!(strip_html_tags(input), input);
    }

    #[test]
    fn images_removed_links_unwrapped() {
        let input = "![chart](/img/cop.png) See [the study](https://example.com/s) now";
        let result = unwrap_links(&strip_images(input));
        assert_eq!(result, " See the study now");
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(decode_entities("R&amp;D&nbsp;costs"), "R&D costs");
    }

    #[test]
    fn blank_lines_collapse_to_one() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn full_pipeline() {
        let input = "  <p>First   paragraph</p>\r\n\r\n\r\n\r\n<p>Second\tone</p>  ";
        assert_eq!(run_pipeline(input), "First paragraph\n\nSecond one");
    }
}
