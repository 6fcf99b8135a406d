//! Content-type classification.
//!
//! The free-text content type from an order is classified exactly once, when
//! the work item is created. Every stage dispatches on the stored
//! [`ContentKind`] and never looks at the raw text again.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PapermillError;

string_enum! {
    /// Degree level of an academic work.
    WorkType {
        Bachelor => "lic",
        Master => "mgr",
    }
}

impl WorkType {
    /// Number of chapters in the body of the thesis.
    pub fn chapter_count(&self) -> u32 {
        match self {
            Self::Bachelor => 3,
            Self::Master => 4,
        }
    }
}

/// What kind of document a work item asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Article,
    ProductDescription,
    Other,
    Academic(WorkType),
}

impl ContentKind {
    pub fn is_academic(&self) -> bool {
        matches!(self, Self::Academic(_))
    }

    pub fn work_type(&self) -> Option<WorkType> {
        match self {
            Self::Academic(work_type) => Some(*work_type),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::ProductDescription => "product_description",
            Self::Other => "other",
            Self::Academic(WorkType::Bachelor) => "academic_lic",
            Self::Academic(WorkType::Master) => "academic_mgr",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = PapermillError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "article" => Ok(Self::Article),
            "product_description" => Ok(Self::ProductDescription),
            "other" => Ok(Self::Other),
            "academic_lic" => Ok(Self::Academic(WorkType::Bachelor)),
            "academic_mgr" => Ok(Self::Academic(WorkType::Master)),
            other => Err(PapermillError::parse(format!("unknown content kind '{other}'"))),
        }
    }
}

impl Serialize for ContentKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

// Long markers match as substrings, so inflected Polish forms are covered.
const MASTER_STEMS: &[&str] = &["magister"];
const MASTER_WORDS: &[&str] = &["master", "mgr", "masters"];

const BACHELOR_STEMS: &[&str] = &["licencja", "licencjack", "inżynier", "inzynier"];
const BACHELOR_WORDS: &[&str] = &["bachelor", "lic", "inż", "inz", "bachelors"];

const THESIS_STEMS: &[&str] = &["thesis", "praca dyplomowa", "academic", "dyplomow"];

const ARTICLE_STEMS: &[&str] = &["article", "artykuł", "artykul", "blog"];
const PRODUCT_STEMS: &[&str] = &["product", "opis produktu", "produkt"];

/// Classify a free-text content type.
///
/// Degree markers win over generic thesis markers; an academic text with no
/// degree marker is treated as a bachelor's work.
pub fn classify_content_type(raw: &str) -> ContentKind {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return ContentKind::Other;
    }

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let has_stem = |stems: &[&str]| stems.iter().any(|s| lower.contains(s));
    let has_word = |list: &[&str]| words.iter().any(|w| list.contains(w));

    if has_stem(MASTER_STEMS) || has_word(MASTER_WORDS) {
        return ContentKind::Academic(WorkType::Master);
    }
    if has_stem(BACHELOR_STEMS) || has_word(BACHELOR_WORDS) {
        return ContentKind::Academic(WorkType::Bachelor);
    }
    if has_stem(THESIS_STEMS) {
        return ContentKind::Academic(WorkType::Bachelor);
    }
    if has_stem(ARTICLE_STEMS) {
        return ContentKind::Article;
    }
    if has_stem(PRODUCT_STEMS) {
        return ContentKind::ProductDescription;
    }
    ContentKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_markers() {
        for raw in [
            "Praca magisterska",
            "magister",
            "Master's thesis",
            "praca mgr",
            "MGR",
        ] {
            assert_eq!(
                classify_content_type(raw),
                ContentKind::Academic(WorkType::Master),
                "{raw}"
            );
        }
    }

    #[test]
    fn bachelor_markers() {
        for raw in [
            "Praca licencjacka",
            "licencjat",
            "praca inżynierska",
            "Bachelor thesis",
            "lic.",
        ] {
            assert_eq!(
                classify_content_type(raw),
                ContentKind::Academic(WorkType::Bachelor),
                "{raw}"
            );
        }
    }

    #[test]
    fn generic_thesis_defaults_to_bachelor() {
        assert_eq!(
            classify_content_type("praca dyplomowa"),
            ContentKind::Academic(WorkType::Bachelor)
        );
        assert_eq!(
            classify_content_type("academic paper"),
            ContentKind::Academic(WorkType::Bachelor)
        );
    }

    #[test]
    fn short_markers_need_whole_words() {
        // "public" contains "lic"
        assert_eq!(classify_content_type("public blog post"), ContentKind::Article);
    }

    #[test]
    fn non_academic_kinds() {
        assert_eq!(classify_content_type("article"), ContentKind::Article);
        assert_eq!(classify_content_type("Artykuł blogowy"), ContentKind::Article);
        assert_eq!(
            classify_content_type("Opis produktu"),
            ContentKind::ProductDescription
        );
        assert_eq!(classify_content_type("newsletter"), ContentKind::Other);
        assert_eq!(classify_content_type("   "), ContentKind::Other);
    }

    #[test]
    fn chapter_counts() {
        assert_eq!(WorkType::Bachelor.chapter_count(), 3);
        assert_eq!(WorkType::Master.chapter_count(), 4);
        assert_eq!(WorkType::Master.as_str(), "mgr");
    }

    #[test]
    fn content_kind_string_roundtrip() {
        for kind in [
            ContentKind::Article,
            ContentKind::ProductDescription,
            ContentKind::Other,
            ContentKind::Academic(WorkType::Bachelor),
            ContentKind::Academic(WorkType::Master),
        ] {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
    }
}
