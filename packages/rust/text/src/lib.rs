//! Text helpers shared by the pipeline stages.
//!
//! Normalizes scraped page text (HTML is converted through `htmd` first),
//! and provides char-safe truncation, word/char counting, content hashing
//! and Markdown heading extraction.

mod cleanup;
mod headings;

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use papermill_shared::{PapermillError, Result};

pub use headings::{Heading, extract_headings, headings_at_level};

// ---------------------------------------------------------------------------
// Scraped text normalization
// ---------------------------------------------------------------------------

/// Normalize text returned by the scraping service.
///
/// The service usually returns plain text, but some pages come back as raw
/// HTML. Those are reduced to their main content and converted to Markdown
/// before the cleanup passes run.
#[instrument(skip(raw), fields(raw_len = raw.len()))]
pub fn normalize_scraped(raw: &str) -> Result<String> {
    let text = if looks_like_html(raw) {
        let content_html = extract_content_html(raw);
        let converter = htmd::HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript",
                "svg", "form",
            ])
            .build();
        converter
            .convert(&content_html)
            .map_err(|e| PapermillError::parse(format!("htmd conversion failed: {e}")))?
    } else {
        raw.to_string()
    };

    let cleaned = cleanup::run_pipeline(&text);
    debug!(final_len = cleaned.len(), "normalized scraped text");
    Ok(cleaned)
}

fn looks_like_html(raw: &str) -> bool {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)<(?:!doctype|html|body|div|p|article|main|section)[\s>]")
            .expect("valid regex")
    });
    TAG_RE.is_match(raw)
}

/// Extract the main content HTML, stripping page chrome.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    // Known content containers in priority order
    let selectors = ["article", "main", "[role=\"main\"]", ".content", "#content"];

    for sel_str in &selectors {
        if let Ok(selector) = scraper::Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    // Fallback: use <body> content
    if let Ok(body_sel) = scraper::Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            return body.inner_html();
        }
    }

    html.to_string()
}

// ---------------------------------------------------------------------------
// Sizing helpers
// ---------------------------------------------------------------------------

/// Cut `s` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Number of Unicode scalar values, the unit target lengths are given in.
pub fn char_count(s: &str) -> usize {
    s.chars().count()
}

/// Count words, ignoring Markdown heading markers.
pub fn count_words(s: &str) -> usize {
    s.split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#' || c == '*' || c == '-'))
        .count()
}

/// Hex SHA-256 of a text, used to spot identical pages.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Whether `actual` lies within `target` ± `tolerance` (relative).
pub fn within_tolerance(actual: usize, target: usize, tolerance: f64) -> bool {
    let allowed = target as f64 * tolerance;
    (actual as f64 - target as f64).abs() <= allowed + f64::EPSILON
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
