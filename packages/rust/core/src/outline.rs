//! Outline generation for generic (non-academic) content.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::{info, instrument, warn};

use papermill_shared::{
    GenerationConfig, Outline, PapermillError, RecordStatus, Result, ScrapedSource, WorkItem,
    new_id,
};
use papermill_storage::Storage;

use crate::completion::{Llm, PromptKind};
use crate::labels::content_kind_name;
use crate::prompt::{brief, render_sources, strip_code_fence};
use crate::sizing;

const OUTLINE_OUTPUT_TOKENS: u32 = 1500;

/// Generate and persist the heading structure of `item`.
///
/// A completed outline from an earlier run is returned as is.
#[instrument(skip_all, fields(work_item_id = %item.id))]
pub async fn generate_outline(
    storage: &Storage,
    llm: &Llm,
    config: &GenerationConfig,
    item: &WorkItem,
    sources: &[ScrapedSource],
) -> Result<Outline> {
    let previous = storage.get_outline(&item.id).await?;
    if let Some(existing) = previous.as_ref().filter(|o| o.status == RecordStatus::Completed) {
        info!("reusing completed outline");
        return Ok(existing.clone());
    }

    let requested = sizing::header_count(item.target_length, config);
    let sources_used = render_sources(sources, config.outline_source_chars);
    let prompt = build_prompt(item, requested, &sources_used);
    let now = Utc::now();

    let mut outline = Outline {
        id: previous.map_or_else(new_id, |o| o.id),
        work_item_id: item.id.clone(),
        structure: String::new(),
        header_count: 0,
        sources_used,
        status: RecordStatus::Generating,
        prompt: Some(prompt.clone()),
        tokens_in: 0,
        tokens_out: 0,
        error_message: None,
        created_at: now,
        updated_at: now,
    };
    storage.upsert_outline(&outline).await?;

    let result = llm
        .ask_with_limit(PromptKind::Outline, &prompt, OUTLINE_OUTPUT_TOKENS)
        .await
        .and_then(|response| {
            let headers = parse_headers(&response.text, requested as usize);
            if headers.len() < config.min_headers as usize {
                return Err(PapermillError::validation(format!(
                    "outline has {} headers, need at least {}",
                    headers.len(),
                    config.min_headers
                )));
            }
            Ok((response, headers))
        });

    let (response, headers) = match result {
        Ok(ok) => ok,
        Err(e) => {
            outline.status = RecordStatus::Failed;
            outline.error_message = Some(e.to_string());
            outline.updated_at = Utc::now();
            storage.upsert_outline(&outline).await?;
            return Err(e);
        }
    };

    if headers.len() != requested as usize {
        warn!(requested, received = headers.len(), "outline header count differs");
    }

    outline.structure = render_structure(&headers);
    outline.header_count = headers.len() as u32;
    outline.tokens_in = response.tokens_in;
    outline.tokens_out = response.tokens_out;
    outline.status = RecordStatus::Completed;
    outline.updated_at = Utc::now();
    storage.upsert_outline(&outline).await?;

    info!(headers = outline.header_count, "outline generated");
    Ok(outline)
}

fn build_prompt(item: &WorkItem, headers: u32, sources: &str) -> String {
    format!(
        "Plan the structure of a {kind} titled \"{topic}\" of about {length} characters.\n\
         {brief}\n\
         Produce exactly {headers} section headings that together cover the topic in a \
         logical order. Base them on the sources below.\n\
         Answer with the headings only, one per line, each starting with \"## \".\n\n\
         Sources:\n{sources}\n",
        kind = content_kind_name(item.content_kind),
        topic = item.topic,
        length = item.target_length,
        brief = brief(item),
    )
}

/// Heading texts from an outline answer, at most `max` of them.
///
/// Markdown headings of any level are accepted; an answer without headings
/// is read as one heading per line with list markers and numbering removed.
pub fn parse_headers(answer: &str, max: usize) -> Vec<String> {
    static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?:#{1,6}\s+|[-*•]\s+|\d+[.)]\s+)*").expect("valid regex")
    });

    let answer = strip_code_fence(answer);
    let headings = papermill_text::extract_headings(answer);
    let raw: Vec<String> = if headings.is_empty() {
        answer.lines().map(str::to_string).collect()
    } else {
        headings.into_iter().map(|h| h.text).collect()
    };

    raw.iter()
        .map(|line| {
            MARKER_RE
                .replace(line.trim(), "")
                .trim()
                .trim_matches('*')
                .trim()
                .to_string()
        })
        .filter(|h| !h.is_empty())
        .take(max)
        .collect()
}

/// One `## ` line per heading.
pub fn render_structure(headers: &[String]) -> String {
    headers
        .iter()
        .map(|h| format!("## {h}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedCompletion, seed_sources, seeded_item, test_llm, test_storage};
    use std::sync::Arc;

    #[test]
    fn parses_markdown_headings() {
        let answer = "Here you go:\n## Why retrofit\n## Sizing the pump\n### detail\n## Costs";
        assert_eq!(
            parse_headers(answer, 10),
            vec!["Why retrofit", "Sizing the pump", "detail", "Costs"]
        );
    }

    #[test]
    fn parses_numbered_lists() {
        let answer = "1. **Why retrofit**\n2) Sizing\n- Costs\n\n";
        assert_eq!(parse_headers(answer, 10), vec!["Why retrofit", "Sizing", "Costs"]);
        assert_eq!(parse_headers(answer, 2).len(), 2);
    }

    #[tokio::test]
    async fn short_article_gets_floor_of_three_headers() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "article", 1000).await;
        seed_sources(&storage, &item.id, 3).await;
        let sources = storage.list_completed_sources(&item.id).await.unwrap();

        let scripted = Arc::new(ScriptedCompletion::fluent());
        let outline = generate_outline(
            &storage,
            &test_llm(&scripted),
            &GenerationConfig::default(),
            &item,
            &sources,
        )
        .await
        .unwrap();

        assert_eq!(outline.header_count, 3);
        assert_eq!(outline.headers().len(), 3);
        assert_eq!(outline.status, RecordStatus::Completed);
        assert!(outline.sources_used.contains("[1] Source 1"));
        let prompt = &scripted.requests_of(PromptKind::Outline)[0].prompt;
        assert!(prompt.contains("exactly 3 section headings"));
    }

    #[tokio::test]
    async fn too_few_headers_fails_and_is_recorded() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "article", 1000).await;
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.reply(PromptKind::Outline, "## Only one");

        let err = generate_outline(
            &storage,
            &test_llm(&scripted),
            &GenerationConfig::default(),
            &item,
            &[],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PapermillError::Validation { .. }));

        let stored = storage.get_outline(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Failed);
        assert!(stored.error_message.is_some());
    }

    #[tokio::test]
    async fn completed_outline_is_reused() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "article", 6000).await;
        let scripted = Arc::new(ScriptedCompletion::fluent());
        let llm = test_llm(&scripted);
        let config = GenerationConfig::default();

        let first = generate_outline(&storage, &llm, &config, &item, &[]).await.unwrap();
        let second = generate_outline(&storage, &llm, &config, &item, &[]).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(scripted.requests().len(), 1);
    }
}
