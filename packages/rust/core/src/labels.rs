//! Localized document labels and prompt wording.

use papermill_shared::{ContentKind, WorkType};

/// Section labels for an assembled document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Labels {
    pub table_of_contents: &'static str,
    pub introduction: &'static str,
    pub chapter: &'static str,
    pub conclusion: &'static str,
    pub bibliography: &'static str,
}

const EN: Labels = Labels {
    table_of_contents: "Table of Contents",
    introduction: "Introduction",
    chapter: "Chapter",
    conclusion: "Conclusion",
    bibliography: "Bibliography",
};

const PL: Labels = Labels {
    table_of_contents: "Spis treści",
    introduction: "Wstęp",
    chapter: "Rozdział",
    conclusion: "Zakończenie",
    bibliography: "Bibliografia",
};

impl Labels {
    /// Labels for a language code; unknown languages get English labels.
    pub fn for_language(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "pl" | "pl-pl" => PL,
            _ => EN,
        }
    }

    pub fn all() -> [Labels; 2] {
        [EN, PL]
    }
}

/// Human-readable language name for prompts, falling back to the code.
pub fn language_name(code: &str) -> String {
    match code.trim().to_ascii_lowercase().as_str() {
        "en" | "en-us" | "en-gb" => "English".into(),
        "pl" | "pl-pl" => "Polish".into(),
        "de" => "German".into(),
        "fr" => "French".into(),
        "es" => "Spanish".into(),
        other => other.to_string(),
    }
}

/// Name of a content kind as used in prompts.
pub fn content_kind_name(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Article => "article",
        ContentKind::ProductDescription => "product description",
        ContentKind::Other => "text",
        ContentKind::Academic(WorkType::Bachelor) => "bachelor's thesis",
        ContentKind::Academic(WorkType::Master) => "master's thesis",
    }
}
