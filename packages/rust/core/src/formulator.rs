//! Search-query formulation.
//!
//! The model is asked for a short web-search query; its raw answer is then
//! cleaned up, since models like to add labels, quotes and explanations.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, instrument};

use papermill_shared::{PapermillError, Result, WorkItem};

use crate::completion::{Llm, PromptKind};
use crate::labels::{content_kind_name, language_name};

/// Longest query kept, in words.
pub const MAX_QUERY_WORDS: usize = 8;

/// Operators steering academic searches towards scholarly sources.
pub const SCHOLARLY_OPERATORS: &str = "(site:edu OR site:gov OR filetype:pdf)";

const QUERY_OUTPUT_TOKENS: u32 = 60;

/// Ask the model for a search query for `item`.
#[instrument(skip_all, fields(work_item_id = %item.id))]
pub async fn formulate_query(llm: &Llm, item: &WorkItem) -> Result<String> {
    let prompt = build_prompt(item);
    let response = llm
        .ask_with_limit(PromptKind::SearchQuery, &prompt, QUERY_OUTPUT_TOKENS)
        .await?;

    let query = clean_query(&response.text, item.content_kind.is_academic()).ok_or_else(|| {
        PapermillError::Formulation(format!(
            "model answer contained no usable query: {:?}",
            response.text.chars().take(120).collect::<String>()
        ))
    })?;

    info!(%query, "search query formulated");
    Ok(query)
}

fn build_prompt(item: &WorkItem) -> String {
    let mut prompt = format!(
        "Write one web search query that finds good background sources for a text.\n\n\
         Topic: {}\n\
         Type of text: {}\n\
         Language of the sources: {}\n",
        item.topic,
        content_kind_name(item.content_kind),
        language_name(&item.language),
    );
    if let Some(guidelines) = item.guidelines.as_deref().filter(|g| !g.trim().is_empty()) {
        prompt.push_str(&format!("Guidelines: {}\n", guidelines.trim()));
    }
    if !item.keywords.is_empty() {
        prompt.push_str(&format!("Keywords: {}\n", item.keywords.join(", ")));
    }
    prompt.push_str(&format!(
        "\nAnswer with the query only, at most {MAX_QUERY_WORDS} words, \
         in the language of the sources. No quotes, no explanation."
    ));
    prompt
}

/// Turn a raw model answer into a search query.
///
/// Strips labels such as `Query:`, surrounding quotes and backticks, keeps
/// the first non-empty line, collapses whitespace and caps the length.
/// Academic queries get [`SCHOLARLY_OPERATORS`] appended. Returns `None`
/// when nothing usable is left.
pub fn clean_query(raw: &str, academic: bool) -> Option<String> {
    static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^(?:search\s+query|query|zapytanie(?:\s+wyszukiwania)?|wyszukiwanie)\s*[:\-]\s*")
            .expect("valid regex")
    });

    let line = crate::prompt::strip_code_fence(raw)
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with("```"))
        .map(|l| l.trim_matches(|c| c == '`' || c == '*'))
        .find(|l| !l.is_empty())?;

    let line = PREFIX_RE.replace(line, "");
    let line = line.trim().trim_matches(|c: char| {
        matches!(c, '"' | '\'' | '`' | '„' | '”' | '“' | '«' | '»')
    });

    let words: Vec<&str> = line.split_whitespace().take(MAX_QUERY_WORDS).collect();
    if words.is_empty() {
        return None;
    }

    let mut query = words.join(" ");
    if academic {
        query.push(' ');
        query.push_str(SCHOLARLY_OPERATORS);
    }
    Some(query)
}
