//! Citation extraction and bibliography entry cleanup.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use papermill_shared::ScrapedSource;

use crate::prompt::strip_code_fence;

/// In-text citation markers: `(Surname, 2020)`, `(Surname et al., 2020)`,
/// `(Surname and Other, 2020)` and the bracketed `[Surname, 2020]`.
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[(\[]((?:\p{Lu}[\p{L}'\-]+)(?:\s+(?:et al\.|and|i|&)\s*(?:\p{Lu}[\p{L}'\-]+)?)?),\s*((?:19|20)\d{2}[a-z]?)[)\]]",
    )
    .expect("valid regex")
});

/// Leading list marker or numbering of a bibliography line.
static ENTRY_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•]\s+|\[\d+\]\s*|\d+[.)]\s+)+").expect("valid regex")
});

/// Distinct citation markers in `text`, as `Surname, Year`, sorted
/// case-insensitively.
pub fn extract_citations(text: &str) -> Vec<String> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for caps in CITATION_RE.captures_iter(text) {
        let author = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
        let citation = format!("{author}, {}", &caps[2]);
        seen.entry(citation.to_lowercase()).or_insert(citation);
    }
    seen.into_values().collect()
}

/// Bibliography lines from a model answer: markers and numbering removed,
/// duplicates dropped, sorted alphabetically.
pub fn clean_entries(answer: &str) -> Vec<String> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for line in strip_code_fence(answer).lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = ENTRY_PREFIX_RE.replace(line, "").trim().to_string();
        if entry.is_empty() {
            continue;
        }
        seen.entry(entry.to_lowercase()).or_insert(entry);
    }
    seen.into_values().collect()
}

/// Bibliography built from the selected sources alone.
pub fn from_sources(sources: &[ScrapedSource]) -> Vec<String> {
    let mut entries: Vec<String> = sources
        .iter()
        .map(|s| match s.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => format!("{title}. {}", s.url),
            _ => s.url.clone(),
        })
        .collect();
    entries.sort_by_key(|e| e.to_lowercase());
    entries.dedup();
    entries
}

/// One entry per line, as stored in the bibliography section.
pub fn render(entries: &[String]) -> String {
    entries
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}
