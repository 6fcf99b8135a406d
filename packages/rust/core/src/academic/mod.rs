//! Multi-stage generation of bachelor's and master's theses.
//!
//! An [`AcademicWork`] replaces the outline and the single generated body of
//! generic content. It is produced in order: table of contents, chapters
//! one by one, introduction, conclusion, bibliography, assembly. Every part
//! is persisted as soon as it is done, so a failed run resumes after the
//! last completed part once the work item is reopened.

mod assemble;
mod bibliography;
mod prompts;
mod toc;

pub use assemble::{assemble_document, extract_table_of_contents};
pub use bibliography::{clean_entries, extract_citations};
pub use toc::{parse_toc, render_display, render_full};

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use papermill_shared::{
    AcademicSection, AcademicStatus, AcademicWork, ChapterKind, GenerationConfig, PapermillError,
    RecordStatus, Result, ScrapedSource, SectionKind, TocChapter, WorkItem, WorkType, new_id,
};
use papermill_storage::Storage;
use papermill_text::{char_count, within_tolerance};

use crate::completion::{Llm, PromptKind};
use crate::labels::Labels;
use crate::prompt::{render_sources, strip_code_fence};
use crate::sizing::{self, AcademicBudget};

use prompts::ChapterPrompt;

const TOC_OUTPUT_TOKENS: u32 = 2000;
const BIBLIOGRAPHY_OUTPUT_TOKENS: u32 = 2000;

/// Drives the academic sub-pipeline of one work item.
pub struct AcademicGenerator<'a> {
    storage: &'a Storage,
    llm: &'a Llm,
    config: &'a GenerationConfig,
    item: &'a WorkItem,
    work_type: WorkType,
    labels: Labels,
    budget: AcademicBudget,
}

impl<'a> AcademicGenerator<'a> {
    pub fn new(
        storage: &'a Storage,
        llm: &'a Llm,
        config: &'a GenerationConfig,
        item: &'a WorkItem,
    ) -> Result<Self> {
        let work_type = item.content_kind.work_type().ok_or_else(|| {
            PapermillError::validation(format!(
                "work item {} is a {}, not an academic work",
                item.id,
                item.content_kind.as_str()
            ))
        })?;
        Ok(Self {
            storage,
            llm,
            config,
            item,
            work_type,
            labels: Labels::for_language(&item.language),
            budget: AcademicBudget::split(item.target_length, work_type),
        })
    }

    /// The stored academic work, or a fresh one in `GeneratingToc`.
    ///
    /// A failed work is only picked up again after the work item has been
    /// reopened, which rewinds it to its last checkpoint.
    pub async fn load_or_create(&self) -> Result<AcademicWork> {
        if let Some(work) = self.storage.get_academic_work(&self.item.id).await? {
            if work.status == AcademicStatus::Failed {
                return Err(PapermillError::validation(format!(
                    "academic work of {} failed ({}); reopen the work item to resume",
                    self.item.id,
                    work.error_message.as_deref().unwrap_or("no message")
                )));
            }
            return Ok(work);
        }

        let now = Utc::now();
        let work = AcademicWork {
            id: new_id(),
            work_item_id: self.item.id.clone(),
            work_type: self.work_type,
            status: AcademicStatus::GeneratingToc,
            toc_display: None,
            toc_full: None,
            table_of_contents: Vec::new(),
            toc_prompt: None,
            toc_tokens_in: 0,
            toc_tokens_out: 0,
            toc_duration_ms: 0,
            toc_char_count: 0,
            final_char_count: 0,
            final_text: None,
            error_message: None,
            sections: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.storage.upsert_academic_work(&work).await?;
        info!(academic_work_id = %work.id, work_type = %self.work_type, "academic work created");
        Ok(work)
    }

    /// Generate the table of contents unless the work already has one.
    #[instrument(skip_all, fields(work_item_id = %self.item.id))]
    pub async fn ensure_toc(&self, work: &mut AcademicWork, sources: &[ScrapedSource]) -> Result<()> {
        if work.has_toc() {
            debug!("table of contents already present");
            return Ok(());
        }
        let result = self.generate_toc(work, sources).await;
        self.record_failure(work, result).await
    }

    async fn generate_toc(&self, work: &mut AcademicWork, sources: &[ScrapedSource]) -> Result<()> {
        let expected = self.work_type.chapter_count();
        let prompt = toc::build_prompt(
            self.item,
            self.work_type,
            &render_sources(sources, self.config.outline_source_chars),
        );
        work.toc_prompt = Some(prompt.clone());

        let started = Instant::now();
        let response = self
            .llm
            .ask_with_limit(PromptKind::TableOfContents, &prompt, TOC_OUTPUT_TOKENS)
            .await?;
        work.toc_tokens_in = response.tokens_in;
        work.toc_tokens_out = response.tokens_out;
        work.toc_duration_ms = started.elapsed().as_millis() as u64;
        work.toc_char_count = char_count(&response.text);
        let chapters = parse_toc(&response.text, expected)?;

        work.toc_full = Some(render_full(&chapters));
        work.toc_display = Some(render_display(&chapters, &self.labels));
        work.table_of_contents = chapters;
        work.updated_at = Utc::now();
        self.storage.upsert_academic_work(work).await?;
        self.advance(work, AcademicStatus::TocCompleted).await?;

        info!(chapters = expected, "table of contents generated");
        Ok(())
    }

    /// Write every missing part and assemble the final text.
    #[instrument(skip_all, fields(work_item_id = %self.item.id))]
    pub async fn write(&self, work: &mut AcademicWork, sources: &[ScrapedSource]) -> Result<()> {
        if work.is_completed() {
            debug!("academic work already completed");
            return Ok(());
        }
        if !work.has_toc() {
            return Err(PapermillError::validation(
                "academic work has no table of contents yet",
            ));
        }
        let result = self.write_parts(work, sources).await;
        self.record_failure(work, result).await
    }

    async fn write_parts(&self, work: &mut AcademicWork, sources: &[ScrapedSource]) -> Result<()> {
        let rendered = render_sources(sources, self.config.content_source_chars);

        for chapter in work.table_of_contents.clone() {
            if work.chapter(chapter.number).is_some_and(|c| c.is_completed()) {
                debug!(chapter = chapter.number, "chapter already written");
                continue;
            }
            self.write_chapter(work, &chapter, &rendered).await?;
        }

        if !self.part_done(work, SectionKind::Introduction) {
            self.advance(work, AcademicStatus::GeneratingIntroduction).await?;
            let prompt = prompts::introduction(self.item, work, self.budget.introduction);
            let section = self
                .generate_section(
                    work,
                    SectionKind::Introduction,
                    0,
                    self.labels.introduction,
                    None,
                    PromptKind::Introduction,
                    prompt,
                    self.budget.introduction,
                )
                .await?;
            put_section(work, section);
            self.advance(work, AcademicStatus::IntroductionCompleted).await?;
        }

        if !self.part_done(work, SectionKind::Conclusion) {
            self.advance(work, AcademicStatus::GeneratingConclusion).await?;
            let introduction = work
                .part(SectionKind::Introduction)
                .map(|s| s.content_or_empty().to_string())
                .unwrap_or_default();
            let prompt =
                prompts::conclusion(self.item, work, &introduction, self.budget.conclusion);
            let section = self
                .generate_section(
                    work,
                    SectionKind::Conclusion,
                    0,
                    self.labels.conclusion,
                    None,
                    PromptKind::Conclusion,
                    prompt,
                    self.budget.conclusion,
                )
                .await?;
            put_section(work, section);
            self.advance(work, AcademicStatus::ConclusionCompleted).await?;
        }

        if !self.part_done(work, SectionKind::Bibliography) {
            self.advance(work, AcademicStatus::GeneratingBibliography).await?;
            self.write_bibliography(work, sources, &rendered).await?;
            self.advance(work, AcademicStatus::BibliographyCompleted).await?;
        }

        self.advance(work, AcademicStatus::Assembling).await?;
        let document = assemble_document(&self.item.topic, &self.labels, work);
        let chars = char_count(&document);
        work.final_text = Some(document);
        work.final_char_count = chars;
        work.updated_at = Utc::now();
        self.storage.upsert_academic_work(work).await?;
        self.advance(work, AcademicStatus::Completed).await?;

        info!(chars, target = self.item.target_length, "academic work assembled");
        Ok(())
    }

    async fn write_chapter(
        &self,
        work: &mut AcademicWork,
        chapter: &TocChapter,
        sources: &str,
    ) -> Result<()> {
        let number = chapter.number;
        let kind = ChapterKind::for_chapter(number);
        self.advance(work, AcademicStatus::ChapterGenerating(number)).await?;

        let prompt = ChapterPrompt {
            item: self.item,
            work: &*work,
            chapter,
            kind,
            budget: self.budget.per_chapter,
            upper: sizing::upper_bound(self.budget.per_chapter, self.config.length_tolerance),
            sources,
        }
        .render();

        let section = self
            .generate_section(
                work,
                SectionKind::Chapter,
                number,
                &chapter.title,
                Some(kind),
                PromptKind::Chapter,
                prompt,
                self.budget.per_chapter,
            )
            .await?;
        info!(
            chapter = number,
            kind = %kind,
            chars = section.char_count,
            budget = self.budget.per_chapter,
            "chapter written"
        );
        put_section(work, section);
        self.advance(work, AcademicStatus::ChapterCompleted(number)).await
    }

    /// Cited works formatted by the model; without any citation marker the
    /// selected sources are listed directly.
    async fn write_bibliography(
        &self,
        work: &mut AcademicWork,
        sources: &[ScrapedSource],
        rendered: &str,
    ) -> Result<()> {
        let cited_text = work
            .sections
            .iter()
            .filter(|s| s.kind != SectionKind::Bibliography)
            .map(|s| s.content_or_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let citations = extract_citations(&cited_text);

        let mut section = self
            .begin_section(
                work,
                SectionKind::Bibliography,
                0,
                self.labels.bibliography,
                None,
                None,
            )
            .await?;

        let started = Instant::now();
        let entries = if citations.is_empty() {
            info!("no citation markers, listing selected sources");
            bibliography::from_sources(sources)
        } else {
            let prompt = prompts::bibliography(self.item, &citations, rendered);
            section.prompt = Some(prompt.clone());
            let response = match self
                .llm
                .ask_with_limit(PromptKind::Bibliography, &prompt, BIBLIOGRAPHY_OUTPUT_TOKENS)
                .await
            {
                Ok(response) => response,
                Err(e) => return Err(self.fail_section(&mut section, e).await),
            };
            section.tokens_in = response.tokens_in;
            section.tokens_out = response.tokens_out;
            let entries = clean_entries(&response.text);
            if entries.is_empty() {
                warn!("model returned no bibliography entries, using citation markers");
                citations
            } else {
                entries
            }
        };

        let content = bibliography::render(&entries);
        section.char_count = char_count(&content);
        section.content = Some(content);
        section.duration_ms = started.elapsed().as_millis() as u64;
        section.status = RecordStatus::Completed;
        section.updated_at = Utc::now();
        self.storage.upsert_section(&section).await?;
        info!(entries = entries.len(), "bibliography written");
        put_section(work, section);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sections
    // -----------------------------------------------------------------------

    /// Persist a section in `Generating`, reusing the id of an earlier
    /// attempt.
    async fn begin_section(
        &self,
        work: &AcademicWork,
        kind: SectionKind,
        number: u32,
        title: &str,
        chapter_kind: Option<ChapterKind>,
        prompt: Option<String>,
    ) -> Result<AcademicSection> {
        let previous = work.sections.iter().find(|s| s.kind == kind && s.number == number);
        let now = Utc::now();
        let section = AcademicSection {
            id: previous.map_or_else(new_id, |s| s.id.clone()),
            academic_work_id: work.id.clone(),
            kind,
            number,
            title: title.to_string(),
            chapter_kind,
            content: None,
            prompt,
            char_count: 0,
            tokens_in: 0,
            tokens_out: 0,
            duration_ms: 0,
            status: RecordStatus::Generating,
            error_message: None,
            created_at: previous.map_or(now, |s| s.created_at),
            updated_at: now,
        };
        self.storage.upsert_section(&section).await?;
        Ok(section)
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate_section(
        &self,
        work: &AcademicWork,
        kind: SectionKind,
        number: u32,
        title: &str,
        chapter_kind: Option<ChapterKind>,
        prompt_kind: PromptKind,
        prompt: String,
        budget: u32,
    ) -> Result<AcademicSection> {
        let mut section = self
            .begin_section(work, kind, number, title, chapter_kind, Some(prompt.clone()))
            .await?;

        let max_tokens = sizing::output_tokens_for(budget, self.config.length_tolerance);
        let started = Instant::now();
        let response = match self.llm.ask_with_limit(prompt_kind, &prompt, max_tokens).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail_section(&mut section, e).await),
        };

        let content = strip_code_fence(&response.text).to_string();
        let chars = char_count(&content);
        if !within_tolerance(chars, budget as usize, self.config.length_tolerance) {
            warn!(part = %kind, number, chars, budget, "part outside the length window");
        }

        section.content = Some(content);
        section.char_count = chars;
        section.tokens_in = response.tokens_in;
        section.tokens_out = response.tokens_out;
        section.duration_ms = started.elapsed().as_millis() as u64;
        section.status = RecordStatus::Completed;
        section.updated_at = Utc::now();
        self.storage.upsert_section(&section).await?;
        Ok(section)
    }

    /// Record the failure on the section and hand the error back.
    async fn fail_section(&self, section: &mut AcademicSection, err: PapermillError) -> PapermillError {
        section.status = RecordStatus::Failed;
        section.error_message = Some(err.to_string());
        section.updated_at = Utc::now();
        if let Err(store_err) = self.storage.upsert_section(section).await {
            warn!(error = %store_err, "could not record section failure");
        }
        err
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    fn part_done(&self, work: &AcademicWork, kind: SectionKind) -> bool {
        work.part(kind).is_some_and(|s| s.is_completed())
    }

    /// Move the work forward; a status it is already past is left alone.
    async fn advance(&self, work: &mut AcademicWork, next: AcademicStatus) -> Result<()> {
        if work.status == next {
            return Ok(());
        }
        if !work.status.can_transition_to(next) {
            debug!(from = %work.status, to = %next, "status already past, not moving back");
            return Ok(());
        }
        self.storage.update_academic_status(&work.id, next).await?;
        work.status = next;
        Ok(())
    }

    async fn record_failure(&self, work: &mut AcademicWork, result: Result<()>) -> Result<()> {
        if let Err(e) = &result {
            let message = e.to_string();
            warn!(academic_work_id = %work.id, status = %work.status, error = %message, "academic work failed");
            self.storage.fail_academic_work(&work.id, &message).await?;
            work.status = AcademicStatus::Failed;
            work.error_message = Some(message);
        }
        result
    }
}

/// Replace or add `section` in the loaded work, keeping storage order.
fn put_section(work: &mut AcademicWork, section: AcademicSection) {
    match work
        .sections
        .iter_mut()
        .find(|s| s.kind == section.kind && s.number == section.number)
    {
        Some(existing) => *existing = section,
        None => work.sections.push(section),
    }
    work.sections.sort_by_key(|s| (section_rank(s.kind), s.number));
}

fn section_rank(kind: SectionKind) -> u8 {
    match kind {
        SectionKind::Chapter => 0,
        SectionKind::Introduction => 1,
        SectionKind::Conclusion => 2,
        SectionKind::Bibliography => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedCompletion, seed_sources, seeded_item, test_llm, test_storage};
    use papermill_shared::WorkItemStatus;
    use std::sync::Arc;

    async fn run_all(
        storage: &Storage,
        llm: &Llm,
        config: &GenerationConfig,
        item: &WorkItem,
        sources: &[ScrapedSource],
    ) -> Result<AcademicWork> {
        let generator = AcademicGenerator::new(storage, llm, config, item)?;
        let mut work = generator.load_or_create().await?;
        generator.ensure_toc(&mut work, sources).await?;
        generator.write(&mut work, sources).await?;
        Ok(work)
    }

    #[tokio::test]
    async fn masters_thesis_end_to_end() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "Master's thesis", 40_000).await;
        seed_sources(&storage, &item.id, 4).await;
        let sources = storage.list_completed_sources(&item.id).await.unwrap();
        let scripted = Arc::new(ScriptedCompletion::fluent());
        let llm = test_llm(&scripted);
        let config = GenerationConfig::default();

        let work = run_all(&storage, &llm, &config, &item, &sources).await.unwrap();
        assert_eq!(work.status, AcademicStatus::Completed);
        assert_eq!(work.table_of_contents.len(), 4);

        let chapter_prompts = scripted.requests_of(PromptKind::Chapter);
        assert_eq!(chapter_prompts.len(), 4);
        for (i, req) in chapter_prompts.iter().enumerate() {
            let empirical = req.prompt.contains("Chapter type: EMPIRICAL");
            assert_eq!(empirical, i == 2, "chapter {}", i + 1);
        }
        // Later chapters see how the earlier ones ended.
        assert!(!chapter_prompts[0].prompt.contains("ends with"));
        assert!(chapter_prompts[3].prompt.contains("Chapter 3 (Chapter title 3) ends with"));

        let stored = storage.get_academic_work(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AcademicStatus::Completed);
        assert_eq!(stored.chapters().count(), 4);
        assert!(stored.sections.iter().all(|s| s.is_completed()));
        assert_eq!(
            stored.chapter(3).and_then(|c| c.chapter_kind),
            Some(ChapterKind::Empirical)
        );
        assert!(stored.chapter(3).unwrap().content_or_empty().contains("Survey"));

        assert!(stored.toc_tokens_in > 0);
        assert!(stored.toc_tokens_out > 0);
        assert!(stored.toc_char_count > 0);
        assert!(stored.toc_prompt.is_some());

        let final_text = stored.final_text.as_deref().unwrap();
        assert_eq!(stored.final_char_count, final_text.chars().count());
        let extracted = extract_table_of_contents(final_text);
        assert_eq!(
            extracted.iter().map(|c| c.title.as_str()).collect::<Vec<_>>(),
            stored
                .table_of_contents
                .iter()
                .map(|c| c.title.as_str())
                .collect::<Vec<_>>()
        );

        let bibliography = stored.part(SectionKind::Bibliography).unwrap();
        assert!(bibliography.content_or_empty().contains("Kowalski, A. (2020)"));
        let bib_prompt = &scripted.requests_of(PromptKind::Bibliography)[0].prompt;
        assert!(bib_prompt.contains("- Kowalski, 2020"));
        assert!(bib_prompt.contains("- Nowak, 2018"));
    }

    #[tokio::test]
    async fn failed_chapter_resumes_after_reopen() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "praca licencjacka", 20_000).await;
        let scripted = Arc::new(ScriptedCompletion::fluent());
        scripted.reply(PromptKind::Chapter, "First chapter (Kowalski, 2020).");
        scripted.fail(PromptKind::Chapter, "upstream timeout");
        let llm = test_llm(&scripted);
        let config = GenerationConfig::default();

        let err = run_all(&storage, &llm, &config, &item, &[]).await.unwrap_err();
        assert!(err.to_string().contains("upstream timeout"));

        let failed = storage.get_academic_work(&item.id).await.unwrap().unwrap();
        assert_eq!(failed.status, AcademicStatus::Failed);
        assert!(failed.chapter(1).unwrap().is_completed());
        assert_eq!(failed.chapter(2).unwrap().status, RecordStatus::Failed);
        assert!(failed.chapter(3).is_none());
        assert_eq!(scripted.requests_of(PromptKind::Chapter).len(), 2);

        // A failed work is not picked up until the item is reopened.
        let err = run_all(&storage, &llm, &config, &item, &[]).await.unwrap_err();
        assert!(err.to_string().contains("reopen"));

        storage
            .fail_work_item(&item.id, WorkItemStatus::Cancelled, "chapter failed")
            .await
            .unwrap();
        storage.reopen_work_item(&item.id).await.unwrap();

        let work = run_all(&storage, &llm, &config, &item, &[]).await.unwrap();
        assert_eq!(work.status, AcademicStatus::Completed);
        assert_eq!(scripted.requests_of(PromptKind::TableOfContents).len(), 1);
        // Chapter 1 was kept; chapters 2 and 3 were written on the second run.
        assert_eq!(scripted.requests_of(PromptKind::Chapter).len(), 4);
        assert_eq!(work.chapter(1).unwrap().content_or_empty(), "First chapter (Kowalski, 2020).");
        assert_eq!(work.chapter(2).unwrap().id, failed.chapter(2).unwrap().id);
    }

    #[tokio::test]
    async fn bibliography_without_citations_lists_sources() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "Bachelor thesis", 15_000).await;
        seed_sources(&storage, &item.id, 2).await;
        let sources = storage.list_completed_sources(&item.id).await.unwrap();
        let scripted = Arc::new(ScriptedCompletion::fluent());
        scripted.respond(PromptKind::Chapter, |_| "Plain chapter text.".into());
        scripted.respond(PromptKind::Introduction, |_| "Plain introduction.".into());
        let llm = test_llm(&scripted);

        let work = run_all(&storage, &llm, &GenerationConfig::default(), &item, &sources)
            .await
            .unwrap();
        assert!(scripted.requests_of(PromptKind::Bibliography).is_empty());
        let bibliography = work.part(SectionKind::Bibliography).unwrap().content_or_empty();
        assert!(bibliography.contains("- Source 1. https://example.com/source-1"));
        assert!(bibliography.contains("- Source 2. https://example.com/source-2"));
    }

    #[tokio::test]
    async fn malformed_toc_fails_the_work() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "Bachelor thesis", 15_000).await;
        let scripted = Arc::new(ScriptedCompletion::fluent());
        scripted.reply(PromptKind::TableOfContents, "1. Only one chapter");
        let llm = test_llm(&scripted);

        let err = run_all(&storage, &llm, &GenerationConfig::default(), &item, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PapermillError::Validation { .. }));
        let stored = storage.get_academic_work(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AcademicStatus::Failed);
        assert!(!stored.has_toc());
        assert!(scripted.requests_of(PromptKind::Chapter).is_empty());
    }

    #[tokio::test]
    async fn generic_items_are_rejected() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "article", 1000).await;
        let scripted = Arc::new(ScriptedCompletion::fluent());
        let llm = test_llm(&scripted);
        let config = GenerationConfig::default();
        assert!(AcademicGenerator::new(&storage, &llm, &config, &item).is_err());
    }
}
