//! Test doubles and fixtures shared by the stage tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use papermill_shared::{
    AppConfig, NewWorkItem, PapermillError, Result, ScrapeStatus, SearchEntry, WorkItem,
};
use papermill_storage::Storage;

use crate::completion::{CompletionRequest, CompletionResponse, CompletionService, Llm, PromptKind};

type Responder = Arc<dyn Fn(&CompletionRequest) -> String + Send + Sync>;

/// Completion double answering by prompt kind.
///
/// Queued replies are used first; after that the kind's responder (if any)
/// builds an answer from the request. Every request is recorded.
#[derive(Default)]
pub struct ScriptedCompletion {
    queued: Mutex<HashMap<PromptKind, VecDeque<std::result::Result<String, String>>>>,
    responders: Mutex<HashMap<PromptKind, Responder>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Double with plausible answers for every prompt kind.
    pub fn fluent() -> Self {
        let scripted = Self::new();
        scripted.respond(PromptKind::SearchQuery, |_| "heat pump retrofit efficiency".into());
        scripted.respond(PromptKind::SourceSelection, |_| "1, 2, 3".into());
        scripted.respond(PromptKind::Outline, |req| {
            let count = requested_count(&req.prompt).unwrap_or(3);
            (1..=count)
                .map(|i| format!("## Section {i}"))
                .collect::<Vec<_>>()
                .join("\n")
        });
        scripted.respond(PromptKind::Content, |req| {
            let target = requested_chars(&req.prompt).unwrap_or(1000);
            let headers: Vec<&str> = req
                .prompt
                .lines()
                .filter(|l| l.starts_with("## "))
                .collect();
            body_of_length(&headers, target)
        });
        scripted.respond(PromptKind::TableOfContents, |req| {
            let count = requested_count(&req.prompt).unwrap_or(3);
            (1..=count)
                .map(|i| format!("{i}. Chapter title {i}\n{i}.1. First part\n{i}.2. Second part"))
                .collect::<Vec<_>>()
                .join("\n")
        });
        scripted.respond(PromptKind::Chapter, |req| {
            let empirical = req.prompt.contains("EMPIRICAL");
            format!(
                "Body text of the chapter (Kowalski, 2020). {} Further work (Smith et al., 2019).",
                if empirical { "Survey of 120 households." } else { "Theory." }
            )
        });
        scripted.respond(PromptKind::Introduction, |_| {
            "The introduction frames the problem (Nowak, 2018).".into()
        });
        scripted.respond(PromptKind::Conclusion, |_| "The conclusion closes the work.".into());
        scripted.respond(PromptKind::Bibliography, |_| {
            "- Smith, J. et al. (2019). Heat pumps. Energy Journal.\n\
             - Kowalski, A. (2020). Pompy ciepła. Warszawa.\n\
             - Nowak, B. (2018). Retrofit. Kraków."
                .into()
        });
        scripted
    }

    /// Queue a reply for the next request of `kind`.
    pub fn reply(&self, kind: PromptKind, text: impl Into<String>) {
        self.queued
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(Ok(text.into()));
    }

    /// Queue an error for the next request of `kind`.
    pub fn fail(&self, kind: PromptKind, message: impl Into<String>) {
        self.queued
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(Err(message.into()));
    }

    pub fn respond(
        &self,
        kind: PromptKind,
        responder: impl Fn(&CompletionRequest) -> String + Send + Sync + 'static,
    ) {
        self.responders
            .lock()
            .unwrap()
            .insert(kind, Arc::new(responder));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_of(&self, kind: PromptKind) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.kind)
            .and_then(|q| q.pop_front());

        let text = match queued {
            Some(Ok(text)) => text,
            Some(Err(message)) => return Err(PapermillError::Completion(message)),
            None => {
                // Lock released before the call; a panicking responder must
                // not poison it.
                let responder = self
                    .responders
                    .lock()
                    .unwrap()
                    .get(&request.kind)
                    .cloned()
                    .ok_or_else(|| {
                        PapermillError::Completion(format!(
                            "no scripted answer for {}",
                            request.kind.as_str()
                        ))
                    })?;
                responder(&request)
            }
        };

        Ok(CompletionResponse {
            tokens_in: (request.prompt.len() / 4) as u32,
            tokens_out: (text.len() / 4) as u32,
            latency_ms: 1,
            text,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn number_after(prompt: &str, marker: &str) -> Option<usize> {
    let rest = &prompt[prompt.find(marker)? + marker.len()..];
    rest.split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())?
        .parse()
        .ok()
}

/// Header or chapter count asked for ("exactly N ...").
fn requested_count(prompt: &str) -> Option<usize> {
    number_after(prompt, "exactly ")
}

fn requested_chars(prompt: &str) -> Option<usize> {
    number_after(prompt, "Target length: ")
}

/// Markdown body with the given headers, padded to `target` characters.
fn body_of_length(headers: &[&str], target: usize) -> String {
    let mut body = headers
        .iter()
        .map(|h| format!("{h}\n\nLorem ipsum."))
        .collect::<Vec<_>>()
        .join("\n\n");
    body.push('\n');
    let filler = " Heat pumps move heat.";
    while body.chars().count() + filler.len() <= target {
        body.push_str(filler);
    }
    body
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn test_storage() -> Storage {
    let tmp = std::env::temp_dir().join(format!("pm_test_{}.db", Uuid::now_v7()));
    Storage::open(&tmp).await.expect("open test db")
}

pub async fn seeded_item(storage: &Storage, content_type: &str, target_length: u32) -> WorkItem {
    let item = NewWorkItem {
        topic: "Heat pumps in pre-war apartment buildings".into(),
        target_length,
        content_type: content_type.into(),
        language: "en".into(),
        guidelines: Some("Focus on retrofits.".into()),
        ..Default::default()
    }
    .into_work_item()
    .expect("valid work item");
    storage.create_work_item(&item).await.expect("insert item");
    item
}

/// Insert `count` completed scraped sources.
pub async fn seed_sources(storage: &Storage, work_item_id: &str, count: usize) {
    for i in 1..=count {
        let url = format!("https://example.com/source-{i}");
        let record = storage
            .begin_scrape(work_item_id, &url, Some(&format!("Source {i}")), i as u32)
            .await
            .expect("begin scrape");
        let text = format!("Source {i} explains heat pump sizing and insulation.");
        storage
            .complete_scrape(&record.id, &text, &papermill_text::content_hash(&text))
            .await
            .expect("complete scrape");
    }
    let completed = storage.list_completed_sources(work_item_id).await.unwrap();
    assert!(completed.iter().all(|s| s.status == ScrapeStatus::Completed));
}

pub fn test_llm(scripted: &Arc<ScriptedCompletion>) -> Llm {
    let service: Arc<dyn CompletionService> = scripted.clone();
    Llm::new(service, &AppConfig::default().openrouter).with_model("test/model")
}

pub fn entries(count: usize) -> Vec<SearchEntry> {
    (1..=count)
        .map(|i| SearchEntry {
            title: format!("Result {i}"),
            link: format!("https://example.com/page-{i}"),
            snippet: format!("Snippet {i}"),
        })
        .collect()
}
