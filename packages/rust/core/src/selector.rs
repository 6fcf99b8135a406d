//! Source selection: the model ranks scraped pages and picks the best ones.
//!
//! Selection degrades instead of failing: an unparsable or failed ranking
//! falls back to the first sources in search order.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::{info, instrument, warn};

use papermill_shared::{
    GenerationConfig, PapermillError, Result, ScrapedSource, SourceSelectionRecord, WorkItem,
    new_id,
};
use papermill_storage::Storage;
use papermill_text::truncate_chars;

use crate::completion::{Llm, PromptKind};
use crate::labels::{content_kind_name, language_name};

const SELECTION_OUTPUT_TOKENS: u32 = 60;

/// Result of the selection stage.
#[derive(Debug, Clone)]
pub struct Selection {
    pub record: SourceSelectionRecord,
    pub sources: Vec<ScrapedSource>,
    /// True when an earlier run's selection was reused.
    pub reused: bool,
}

/// Parsed ranking answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSelection {
    /// 1-based indices into the candidate list.
    pub indices: Vec<usize>,
    pub fallback_used: bool,
}

/// Select sources for `item` from its completed scraped sources.
#[instrument(skip_all, fields(work_item_id = %item.id))]
pub async fn select_sources(
    storage: &Storage,
    llm: &Llm,
    config: &GenerationConfig,
    item: &WorkItem,
) -> Result<Selection> {
    if let Some(record) = storage.get_selection(&item.id).await? {
        let sources = storage.list_selected_sources(&item.id).await?;
        if !sources.is_empty() {
            info!(selected = sources.len(), "reusing earlier selection");
            return Ok(Selection {
                record,
                sources,
                reused: true,
            });
        }
    }

    let candidates = storage.list_completed_sources(&item.id).await?;
    if candidates.is_empty() {
        return Err(PapermillError::NoUsableSources { attempted: 0 });
    }

    let prompt = build_prompt(item, &candidates, config);
    let (response, parsed) = if candidates.len() < config.min_selected {
        let all = ParsedSelection {
            indices: (1..=candidates.len()).collect(),
            fallback_used: false,
        };
        (String::new(), all)
    } else {
        match llm
            .ask_with_limit(PromptKind::SourceSelection, &prompt, SELECTION_OUTPUT_TOKENS)
            .await
        {
            Ok(answer) => {
                let parsed = parse_selection(
                    &answer.text,
                    candidates.len(),
                    config.min_selected,
                    config.max_selected,
                );
                (answer.text, parsed)
            }
            Err(e) => {
                warn!(error = %e, "ranking call failed, using first sources");
                let parsed = fallback_selection(candidates.len(), config.min_selected);
                (format!("error: {e}"), parsed)
            }
        }
    };

    if parsed.fallback_used {
        warn!(answer = %response, "ranking unusable, using first sources");
    }

    let marks: Vec<(String, String)> = parsed
        .indices
        .iter()
        .enumerate()
        .map(|(rank, &index)| {
            let reason = if parsed.fallback_used {
                format!("fallback: search position {index}")
            } else if response.is_empty() {
                "too few candidates to rank".to_string()
            } else {
                format!("ranked {} of {} by model", rank + 1, parsed.indices.len())
            };
            (candidates[index - 1].id.clone(), reason)
        })
        .collect();
    storage.mark_selected(&item.id, &marks).await?;

    let record = SourceSelectionRecord {
        id: new_id(),
        work_item_id: item.id.clone(),
        prompt,
        response,
        selected_indices: parsed.indices.clone(),
        fallback_used: parsed.fallback_used,
        created_at: Utc::now(),
    };
    storage.upsert_selection(&record).await?;

    let sources = storage.list_selected_sources(&item.id).await?;
    info!(
        selected = sources.len(),
        candidates = candidates.len(),
        fallback = parsed.fallback_used,
        "sources selected"
    );

    Ok(Selection {
        record,
        sources,
        reused: false,
    })
}

fn build_prompt(item: &WorkItem, candidates: &[ScrapedSource], config: &GenerationConfig) -> String {
    let mut prompt = format!(
        "You are choosing sources for a {} about \"{}\" written in {}.\n\
         Below are {} candidate sources. Pick the {} to {} most relevant and reliable ones.\n\n",
        content_kind_name(item.content_kind),
        item.topic,
        language_name(&item.language),
        candidates.len(),
        config.min_selected,
        config.max_selected,
    );

    for (i, source) in candidates.iter().enumerate() {
        let snippet = truncate_chars(source.text_or_empty(), config.selection_snippet_chars);
        prompt.push_str(&format!(
            "[{}] {}\nURL: {}\n{}\n\n",
            i + 1,
            source.display_title(),
            source.url,
            snippet.trim()
        ));
    }

    prompt.push_str(
        "Answer only with the numbers of the chosen sources, comma-separated, best first \
         (for example: 3, 1, 5).",
    );
    prompt
}

/// Parse a ranking answer into 1-based indices.
///
/// Every integer in the answer is considered; indices outside
/// `1..=candidates` and repeats are dropped, and at most `max` are kept. With
/// fewer than `min` valid indices the first `min` candidates are used instead.
pub fn parse_selection(answer: &str, candidates: usize, min: usize, max: usize) -> ParsedSelection {
    static INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

    let mut seen = HashSet::new();
    let indices: Vec<usize> = INT_RE
        .find_iter(answer)
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .filter(|&i| (1..=candidates).contains(&i))
        .filter(|&i| seen.insert(i))
        .take(max)
        .collect();

    if indices.len() < min.min(candidates) || indices.is_empty() {
        return fallback_selection(candidates, min);
    }

    ParsedSelection {
        indices,
        fallback_used: false,
    }
}

fn fallback_selection(candidates: usize, min: usize) -> ParsedSelection {
    ParsedSelection {
        indices: (1..=min.min(candidates)).collect(),
        fallback_used: true,
    }
}
