//! Single-pass body generation for generic content.

use chrono::Utc;
use tracing::{info, instrument, warn};

use papermill_shared::{
    GeneratedContent, GenerationConfig, Outline, RecordStatus, Result, ScrapedSource, WorkItem,
    new_id,
};
use papermill_storage::Storage;
use papermill_text::{char_count, count_words, headings_at_level, within_tolerance};

use crate::completion::{Llm, PromptKind};
use crate::labels::content_kind_name;
use crate::prompt::{brief, render_sources, strip_code_fence};
use crate::sizing;

/// Generate and persist the full body of `item` following `outline`.
///
/// A completed body from an earlier run is returned as is.
#[instrument(skip_all, fields(work_item_id = %item.id))]
pub async fn generate_content(
    storage: &Storage,
    llm: &Llm,
    config: &GenerationConfig,
    item: &WorkItem,
    outline: &Outline,
    sources: &[ScrapedSource],
) -> Result<GeneratedContent> {
    let previous = storage.get_generated_content(&item.id).await?;
    if let Some(existing) = previous
        .as_ref()
        .filter(|c| c.status == RecordStatus::Completed)
    {
        info!("reusing completed content");
        return Ok(existing.clone());
    }

    let prompt = build_prompt(item, outline, sources, config);
    let now = Utc::now();
    let mut content = GeneratedContent {
        id: previous.map_or_else(new_id, |c| c.id),
        work_item_id: item.id.clone(),
        body: String::new(),
        sections: Vec::new(),
        word_count: 0,
        char_count: 0,
        delivered: false,
        status: RecordStatus::Generating,
        prompt: Some(prompt.clone()),
        tokens_in: 0,
        tokens_out: 0,
        error_message: None,
        created_at: now,
        updated_at: now,
    };
    storage.upsert_generated_content(&content).await?;

    let max_tokens = sizing::output_tokens_for(item.target_length, config.length_tolerance);
    let response = match llm
        .ask_with_limit(PromptKind::Content, &prompt, max_tokens)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            content.status = RecordStatus::Failed;
            content.error_message = Some(e.to_string());
            content.updated_at = Utc::now();
            storage.upsert_generated_content(&content).await?;
            return Err(e);
        }
    };

    let body = strip_code_fence(&response.text).to_string();
    let chars = char_count(&body);
    if !within_tolerance(chars, item.target_length as usize, config.length_tolerance) {
        warn!(
            chars,
            target = item.target_length,
            "generated body outside the length window"
        );
    }

    content.sections = headings_at_level(&body, 2);
    content.word_count = count_words(&body);
    content.char_count = chars;
    content.body = body;
    content.tokens_in = response.tokens_in;
    content.tokens_out = response.tokens_out;
    content.status = RecordStatus::Completed;
    content.updated_at = Utc::now();
    storage.upsert_generated_content(&content).await?;

    info!(
        chars = content.char_count,
        words = content.word_count,
        sections = content.sections.len(),
        "content generated"
    );
    Ok(content)
}

fn build_prompt(
    item: &WorkItem,
    outline: &Outline,
    sources: &[ScrapedSource],
    config: &GenerationConfig,
) -> String {
    let headers = outline.header_count.max(1);
    let per_section = sizing::section_budget(item.target_length, headers);
    let upper = sizing::upper_bound(item.target_length, config.length_tolerance);

    format!(
        "Write a complete {kind} titled \"{topic}\".\n\
         {brief}\n\
         Target length: {length} characters in total, about {per_section} characters per \
         section. Never exceed {upper} characters.\n\
         Follow this structure exactly, keeping each heading as a \"## \" line:\n\n\
         {structure}\n\n\
         Use the sources below for facts. Do not invent statistics. Answer with the text only.\n\n\
         Sources:\n{sources}\n",
        kind = content_kind_name(item.content_kind),
        topic = item.topic,
        brief = brief(item),
        length = item.target_length,
        structure = outline.structure,
        sources = render_sources(sources, config.content_source_chars),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::generate_outline;
    use crate::testing::{ScriptedCompletion, seed_sources, seeded_item, test_llm, test_storage};
    use std::sync::Arc;

    #[tokio::test]
    async fn body_follows_outline_within_tolerance() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "article", 1000).await;
        seed_sources(&storage, &item.id, 3).await;
        let sources = storage.list_completed_sources(&item.id).await.unwrap();
        let scripted = Arc::new(ScriptedCompletion::fluent());
        let llm = test_llm(&scripted);
        let config = GenerationConfig::default();

        let outline = generate_outline(&storage, &llm, &config, &item, &sources)
            .await
            .unwrap();
        let content = generate_content(&storage, &llm, &config, &item, &outline, &sources)
            .await
            .unwrap();

        assert_eq!(scripted.requests_of(PromptKind::Content).len(), 1);
        assert!((800..=1200).contains(&content.char_count), "{}", content.char_count);
        assert_eq!(content.sections, outline.headers());
        assert_eq!(content.status, RecordStatus::Completed);
        assert!(!content.delivered);

        let prompt = &scripted.requests_of(PromptKind::Content)[0].prompt;
        assert!(prompt.contains("Target length: 1000 characters"));
        assert!(prompt.contains("about 333 characters per section"));
        assert!(prompt.contains("Never exceed 1200 characters"));
    }

    #[tokio::test]
    async fn failed_call_marks_record_failed() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "article", 3000).await;
        let scripted = Arc::new(ScriptedCompletion::fluent());
        scripted.fail(PromptKind::Content, "model overloaded");
        let llm = test_llm(&scripted);
        let config = GenerationConfig::default();

        let outline = generate_outline(&storage, &llm, &config, &item, &[])
            .await
            .unwrap();
        let err = generate_content(&storage, &llm, &config, &item, &outline, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model overloaded"));

        let stored = storage.get_generated_content(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Failed);

        // Retrying regenerates and keeps the record id.
        let retried = generate_content(&storage, &llm, &config, &item, &outline, &[])
            .await
            .unwrap();
        assert_eq!(retried.id, stored.id);
        assert_eq!(retried.status, RecordStatus::Completed);
    }
}
