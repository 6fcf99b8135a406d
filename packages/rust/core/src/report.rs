//! Read-only views of a work item's stage records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use papermill_shared::{
    GeneratedContent, RecordStatus, Result, ScrapeStatus, ScrapedSource, SearchResultRecord,
    SourceSelectionRecord, StructureRecord, WorkItem, WorkItemStatus,
};
use papermill_storage::Storage;

/// Everything the pipeline recorded for one work item.
#[derive(Debug, Clone, Serialize)]
pub struct StageView {
    pub work_item: WorkItem,
    pub search: Option<SearchResultRecord>,
    pub scraped: Vec<ScrapedSource>,
    pub selected: Vec<ScrapedSource>,
    pub selection: Option<SourceSelectionRecord>,
    pub structure: Option<StructureRecord>,
    pub content: Option<GeneratedContent>,
}

impl StageView {
    /// Weighted progress in percent: 10 for the item, 20 for search, 30
    /// scaled by the completed share of scrapes, 20 for the structure and
    /// 20 for the content.
    pub fn progress(&self) -> f64 {
        let mut progress = 10.0;

        if self
            .search
            .as_ref()
            .is_some_and(|s| s.status == RecordStatus::Completed)
        {
            progress += 20.0;
        }

        if !self.scraped.is_empty() {
            let completed = self
                .scraped
                .iter()
                .filter(|s| s.status == ScrapeStatus::Completed)
                .count();
            progress += 30.0 * completed as f64 / self.scraped.len() as f64;
        }

        if self.structure.as_ref().is_some_and(StructureRecord::is_completed) {
            progress += 20.0;
        }

        let content_done = match &self.structure {
            Some(StructureRecord::Academic(work)) => work.is_completed(),
            _ => self
                .content
                .as_ref()
                .is_some_and(|c| c.status == RecordStatus::Completed),
        };
        if content_done {
            progress += 20.0;
        }

        progress
    }
}

/// Load the [`StageView`] of a work item.
pub async fn stage_view(storage: &Storage, work_item_id: &str) -> Result<StageView> {
    let work_item = storage.require_work_item(work_item_id).await?;
    Ok(StageView {
        search: storage.get_search_result(work_item_id).await?,
        scraped: storage.list_scraped_sources(work_item_id).await?,
        selected: storage.list_selected_sources(work_item_id).await?,
        selection: storage.get_selection(work_item_id).await?,
        structure: storage.get_structure(work_item_id).await?,
        content: storage.get_generated_content(work_item_id).await?,
        work_item,
    })
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub at: DateTime<Utc>,
    pub stage: &'static str,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub work_item_id: String,
    pub status: WorkItemStatus,
    pub progress: f64,
    pub events: Vec<TimelineEvent>,
}

/// Chronological events of a work item plus its overall progress.
pub async fn timeline(storage: &Storage, work_item_id: &str) -> Result<Timeline> {
    let view = stage_view(storage, work_item_id).await?;
    Ok(build_timeline(&view))
}

fn build_timeline(view: &StageView) -> Timeline {
    let mut events = vec![TimelineEvent {
        at: view.work_item.created_at,
        stage: "work_item",
        status: "created".into(),
        detail: Some(view.work_item.topic.clone()),
    }];

    if let Some(search) = &view.search {
        events.push(TimelineEvent {
            at: search.updated_at,
            stage: "search",
            status: search.status.to_string(),
            detail: Some(match &search.error_message {
                Some(err) => err.clone(),
                None => format!("{} results for '{}'", search.entries.len(), search.query),
            }),
        });
    }

    for source in &view.scraped {
        events.push(TimelineEvent {
            at: source.updated_at,
            stage: "scrape",
            status: source.status.to_string(),
            detail: Some(source.url.clone()),
        });
    }

    if let Some(selection) = &view.selection {
        events.push(TimelineEvent {
            at: selection.created_at,
            stage: "selection",
            status: if selection.fallback_used {
                "fallback".into()
            } else {
                "completed".into()
            },
            detail: Some(format!("{} sources selected", view.selected.len())),
        });
    }

    match &view.structure {
        Some(StructureRecord::Generic(outline)) => events.push(TimelineEvent {
            at: outline.updated_at,
            stage: "outline",
            status: outline.status.to_string(),
            detail: Some(format!("{} headers", outline.header_count)),
        }),
        Some(StructureRecord::Academic(work)) => {
            for section in &work.sections {
                events.push(TimelineEvent {
                    at: section.updated_at,
                    stage: "academic_section",
                    status: section.status.to_string(),
                    detail: Some(if section.number > 0 {
                        format!("{} {}: {}", section.kind, section.number, section.title)
                    } else {
                        section.kind.to_string()
                    }),
                });
            }
            events.push(TimelineEvent {
                at: work.updated_at,
                stage: "academic_work",
                status: work.status.to_string(),
                detail: work.error_message.clone(),
            });
        }
        None => {}
    }

    if let Some(content) = &view.content {
        events.push(TimelineEvent {
            at: content.updated_at,
            stage: "content",
            status: content.status.to_string(),
            detail: Some(format!("{} characters", content.char_count)),
        });
    }

    events.sort_by_key(|e| e.at);

    Timeline {
        work_item_id: view.work_item.id.clone(),
        status: view.work_item.status,
        progress: view.progress(),
        events,
    }
}
