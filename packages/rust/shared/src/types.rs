//! Core domain types: work items and the per-stage records they own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::{ContentKind, WorkType, classify_content_type};
use crate::error::{PapermillError, Result};
use crate::status::{AcademicStatus, OrderStatus, RecordStatus, ScrapeStatus, WorkItemStatus};

/// Maximum number of source-link hints a work item may carry.
pub const MAX_SOURCE_HINTS: usize = 4;

/// Generate a new time-sortable record identifier (UUID v7).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// Orders (external aggregate)
// ---------------------------------------------------------------------------

/// Parent order of one or more work items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_ref: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the completion notification went out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified_at: Option<DateTime<Utc>>,
}

/// One line of an order; receives the delivered text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// Input for creating a work item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub topic: String,
    /// Target length in characters.
    pub target_length: u32,
    /// Free-text content type as written on the order.
    pub content_type: String,
    pub language: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub guidelines: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub source_hints: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_item_id: Option<String>,
}

impl NewWorkItem {
    /// Reject inputs no pipeline could work with.
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(PapermillError::validation("topic must not be empty"));
        }
        if self.target_length == 0 {
            return Err(PapermillError::validation("target length must be positive"));
        }
        if self.language.trim().is_empty() {
            return Err(PapermillError::validation("language must not be empty"));
        }
        if self.source_hints.len() > MAX_SOURCE_HINTS {
            return Err(PapermillError::validation(format!(
                "at most {MAX_SOURCE_HINTS} source hints allowed, got {}",
                self.source_hints.len()
            )));
        }
        Ok(())
    }

    /// Build a pending work item, classifying the content type once.
    pub fn into_work_item(self) -> Result<WorkItem> {
        self.validate()?;
        let now = Utc::now();
        let content_kind = classify_content_type(&self.content_type);
        Ok(WorkItem {
            id: new_id(),
            order_id: self.order_id,
            order_item_id: self.order_item_id,
            user_id: self.user_id,
            topic: self.topic.trim().to_string(),
            target_length: self.target_length,
            content_type: self.content_type,
            content_kind,
            language: self.language.trim().to_lowercase(),
            style: self.style,
            guidelines: self.guidelines,
            keywords: self.keywords,
            source_hints: self.source_hints,
            status: WorkItemStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// One commissioned piece of text, tracked through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub topic: String,
    pub target_length: u32,
    /// Raw content type, kept for display only.
    pub content_type: String,
    pub content_kind: ContentKind,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidelines: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_hints: Vec<String>,
    pub status: WorkItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Outcome of the search stage for a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultRecord {
    pub id: String,
    pub work_item_id: String,
    pub query: String,
    /// Simplified query, set when the first attempt came back empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_query: Option<String>,
    pub language: String,
    pub entries: Vec<SearchEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_results: Option<u64>,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scraping and selection
// ---------------------------------------------------------------------------

/// Extracted text of one discovered URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedSource {
    pub id: String,
    pub work_item_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Rank of the URL in the search results (0-based).
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub text_len: usize,
    /// SHA-256 of the extracted text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub status: ScrapeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Only ever true for completed sources.
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapedSource {
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// Audit trail of one ranking call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSelectionRecord {
    pub id: String,
    pub work_item_id: String,
    pub prompt: String,
    pub response: String,
    /// 1-based indices into the completed sources, in ranking order.
    pub selected_indices: Vec<usize>,
    pub fallback_used: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Generic outline and content
// ---------------------------------------------------------------------------

/// Flat heading structure for a non-academic work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    pub id: String,
    pub work_item_id: String,
    /// Rendered heading list, one `## ` line per header.
    pub structure: String,
    pub header_count: u32,
    /// Source excerpts actually fed to the model.
    pub sources_used: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub tokens_in: u32,
    #[serde(default)]
    pub tokens_out: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Outline {
    /// Header titles without the Markdown prefix.
    pub fn headers(&self) -> Vec<String> {
        self.structure
            .lines()
            .map(str::trim)
            .filter_map(|line| line.strip_prefix("## "))
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect()
    }
}

/// Final body text of a non-academic work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub id: String,
    pub work_item_id: String,
    pub body: String,
    /// Section headings found in the body.
    pub sections: Vec<String>,
    pub word_count: usize,
    pub char_count: usize,
    /// Written back to the order item.
    pub delivered: bool,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub tokens_in: u32,
    #[serde(default)]
    pub tokens_out: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Academic work
// ---------------------------------------------------------------------------

string_enum! {
    /// Part of an academic work.
    SectionKind {
        Chapter => "chapter",
        Introduction => "introduction",
        Conclusion => "conclusion",
        Bibliography => "bibliography",
    }
}

string_enum! {
    /// Prompt branch a chapter is generated under.
    ChapterKind {
        Theory => "theory",
        TheoryAndPractice => "theory_and_practice",
        Empirical => "empirical",
    }
}

impl ChapterKind {
    /// Chapter 1 is theory only and chapter 3 is always empirical.
    pub fn for_chapter(number: u32) -> Self {
        match number {
            1 => Self::Theory,
            3 => Self::Empirical,
            _ => Self::TheoryAndPractice,
        }
    }
}

/// One chapter of the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocChapter {
    pub number: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsections: Vec<String>,
}

/// A generated part of an academic work with its metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicSection {
    pub id: String,
    pub academic_work_id: String,
    pub kind: SectionKind,
    /// Chapter number; 0 for the other parts.
    pub number: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_kind: Option<ChapterKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub char_count: usize,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub duration_ms: u64,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AcademicSection {
    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }

    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Thesis-type replacement for [`Outline`] and [`GeneratedContent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicWork {
    pub id: String,
    pub work_item_id: String,
    pub work_type: WorkType,
    pub status: AcademicStatus,
    /// Simplified table of contents shown in the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toc_display: Option<String>,
    /// Detailed table of contents used in prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toc_full: Option<String>,
    #[serde(default)]
    pub table_of_contents: Vec<TocChapter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toc_prompt: Option<String>,
    #[serde(default)]
    pub toc_tokens_in: u32,
    #[serde(default)]
    pub toc_tokens_out: u32,
    #[serde(default)]
    pub toc_duration_ms: u64,
    /// Characters of the raw table-of-contents answer.
    #[serde(default)]
    pub toc_char_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
    #[serde(default)]
    pub final_char_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Loaded alongside the work; ordered chapters first, by number.
    #[serde(default)]
    pub sections: Vec<AcademicSection>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AcademicWork {
    pub fn chapters(&self) -> impl Iterator<Item = &AcademicSection> {
        self.sections.iter().filter(|s| s.kind == SectionKind::Chapter)
    }

    pub fn chapter(&self, number: u32) -> Option<&AcademicSection> {
        self.chapters().find(|s| s.number == number)
    }

    /// The single introduction, conclusion or bibliography section.
    pub fn part(&self, kind: SectionKind) -> Option<&AcademicSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn is_completed(&self) -> bool {
        self.status == AcademicStatus::Completed
    }

    /// Whether the table of contents has been generated.
    pub fn has_toc(&self) -> bool {
        !self.table_of_contents.is_empty() && self.toc_full.is_some()
    }
}

/// The outline role, filled by either record shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureRecord {
    Generic(Outline),
    Academic(AcademicWork),
}

impl StructureRecord {
    pub fn is_completed(&self) -> bool {
        match self {
            Self::Generic(outline) => outline.status == RecordStatus::Completed,
            Self::Academic(work) => work.has_toc() && work.status != AcademicStatus::Failed,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::Generic(outline) => outline.updated_at,
            Self::Academic(work) => work.updated_at,
        }
    }
}
