//! Markdown heading extraction.

use std::sync::LazyLock;

use regex::Regex;

/// One ATX heading found in a Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
}

/// All ATX headings (`#` to `######`) outside fenced code blocks.
pub fn extract_headings(md: &str) -> Vec<Heading> {
    static H_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)(?:\s+#+)?\s*$").expect("valid regex"));

    let mut in_code_block = false;
    let mut headings = Vec::new();

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            continue;
        }
        if let Some(caps) = H_RE.captures(line.trim_end()) {
            headings.push(Heading {
                level: caps[1].len(),
                text: caps[2].trim().to_string(),
            });
        }
    }

    headings
}

/// Heading texts at exactly `level`.
pub fn headings_at_level(md: &str, level: usize) -> Vec<String> {
    extract_headings(md)
        .into_iter()
        .filter(|h| h.level == level)
        .map(|h| h.text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_levels() {
        let md = "# Title\n\nintro\n\n## First\ntext\n### Detail\n## Second ##\n";
        let headings = extract_headings(md);
        assert_eq!(headings.len(), 4);
        assert_eq!(headings[0].level, 1);
        assert_eq!(headings_at_level(md, 2), vec!["First", "Second"]);
    }

    #[test]
    fn trailing_hash_without_space_belongs_to_the_text() {
        let md = "## Programming in C#\n## Closing run ###\n## F# and C# ##";
        assert_eq!(
            headings_at_level(md, 2),
            vec!["Programming in C#", "Closing run", "F# and C#"]
        );
    }

    #[test]
    fn ignores_code_blocks_and_hashtags() {
        let md = "```bash\n# not a heading\n```\n#hashtag\n## Real";
        assert_eq!(headings_at_level(md, 2), vec!["Real"]);
        assert_eq!(extract_headings(md).len(), 1);
    }
}
