//! End-to-end generation pipeline for one work item.
//!
//! search → scrape → select → structure → content → order sync
//!
//! Every stage first looks for its own completed record and skips the work
//! when one exists, so re-running a reopened work item resumes where the
//! failed run stopped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use papermill_scraper::{ScraperClient, ScraperOptions};
use papermill_search::{SearchClient, SearchOptions};
use papermill_shared::{
    AppConfig, ContentKind, GenerationConfig, PapermillError, RecordStatus, Result, ScrapedSource,
    SearchEntry, SearchResultRecord, StructureRecord, WorkItem, WorkItemStatus, new_id,
};
use papermill_storage::Storage;

use crate::academic::AcademicGenerator;
use crate::completion::{Llm, OpenRouterClient};
use crate::content::generate_content;
use crate::formulator::formulate_query;
use crate::order::{LogNotifier, Notifier, OrderGateway, StorageOrderGateway};
use crate::outline::generate_outline;
use crate::selector::select_sources;

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub work_item_id: String,
    pub content_kind: ContentKind,
    /// Characters of the delivered text.
    pub char_count: usize,
    pub selected_sources: usize,
    /// True when the item had already been completed by an earlier run.
    pub already_completed: bool,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a work item enters a new stage.
    fn stage(&self, work_item_id: &str, stage: WorkItemStatus);
    /// Free-form detail within the current stage.
    fn detail(&self, work_item_id: &str, message: &str);
    /// Called when the pipeline completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _work_item_id: &str, _stage: WorkItemStatus) {}
    fn detail(&self, _work_item_id: &str, _message: &str) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

/// Everything a pipeline run talks to.
pub struct Pipeline {
    storage: Arc<Storage>,
    llm: Llm,
    search: SearchClient,
    scraper: ScraperClient,
    generation: GenerationConfig,
    orders: Arc<dyn OrderGateway>,
    notifier: Arc<dyn Notifier>,
    progress: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    /// Pipeline with the storage-backed order gateway, the log notifier and
    /// no progress output.
    pub fn new(
        storage: Arc<Storage>,
        llm: Llm,
        search: SearchClient,
        scraper: ScraperClient,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            orders: Arc::new(StorageOrderGateway::new(storage.clone())),
            notifier: Arc::new(LogNotifier),
            progress: Arc::new(SilentProgress),
            storage,
            llm,
            search,
            scraper,
            generation,
        }
    }

    /// Build every client from the loaded configuration. Credentials are
    /// read from the environment variables the config names.
    pub fn from_config(storage: Arc<Storage>, config: &AppConfig) -> Result<Self> {
        let service = Arc::new(OpenRouterClient::from_config(&config.openrouter)?);
        let llm = Llm::new(service, &config.openrouter);
        let search = SearchClient::new(SearchOptions::from_config(&config.search)?)?;
        let scraper = ScraperClient::new(ScraperOptions::from(&config.scraper))?;
        Ok(Self::new(
            storage,
            llm,
            search,
            scraper,
            config.generation.clone(),
        ))
    }

    pub fn with_orders(mut self, orders: Arc<dyn OrderGateway>) -> Self {
        self.orders = orders;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Run (or resume) the pipeline for one work item.
    ///
    /// On failure the item is moved to `Cancelled` with the error message,
    /// a failed search record is left behind if the search stage never
    /// wrote one, and the error is returned.
    #[instrument(skip_all, fields(work_item_id = %work_item_id))]
    pub async fn run(&self, work_item_id: &str) -> Result<RunOutcome> {
        let start = Instant::now();
        let item = self.storage.require_work_item(work_item_id).await?;

        match item.status {
            WorkItemStatus::Completed => {
                info!("work item already completed");
                return self.completed_outcome(&item, start).await;
            }
            WorkItemStatus::Cancelled | WorkItemStatus::Error => {
                return Err(PapermillError::validation(format!(
                    "work item {work_item_id} is {}; reopen it to run again",
                    item.status
                )));
            }
            _ => {}
        }

        info!(
            kind = item.content_kind.as_str(),
            target_length = item.target_length,
            resumed_from = %item.status,
            "starting pipeline"
        );

        match self.run_stages(&item, start).await {
            Ok(outcome) => {
                info!(
                    chars = outcome.char_count,
                    sources = outcome.selected_sources,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "pipeline completed"
                );
                self.progress.done(&outcome);
                Ok(outcome)
            }
            Err(e) => {
                self.record_failure(&item, &e).await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, item: &WorkItem, start: Instant) -> Result<RunOutcome> {
        self.advance(item, WorkItemStatus::InProgress).await?;

        // --- Search ---
        self.advance(item, WorkItemStatus::Searching).await?;
        let entries = self.search_stage(item).await?;

        // --- Scrape ---
        self.advance(item, WorkItemStatus::Scraping).await?;
        self.scrape_stage(item, &entries).await?;

        // --- Source selection ---
        self.advance(item, WorkItemStatus::SourceSelection).await?;
        let selection = select_sources(&self.storage, &self.llm, &self.generation, item).await?;
        self.progress.detail(
            &item.id,
            &format!("{} sources selected", selection.sources.len()),
        );

        // --- Structure ---
        self.advance(item, WorkItemStatus::StructureGeneration).await?;
        let structure = self.structure_stage(item, &selection.sources).await?;
        self.advance(item, WorkItemStatus::StructureReady).await?;

        // --- Content ---
        self.advance(item, WorkItemStatus::ContentGeneration).await?;
        let text = self
            .content_stage(item, structure, &selection.sources)
            .await?;

        // --- Delivery ---
        self.sync_order(item, &text).await?;
        self.advance(item, WorkItemStatus::Completed).await?;

        Ok(RunOutcome {
            work_item_id: item.id.clone(),
            content_kind: item.content_kind,
            char_count: text.chars().count(),
            selected_sources: selection.sources.len(),
            already_completed: false,
            elapsed: start.elapsed(),
        })
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Search results for the item, from an earlier completed search or a
    /// fresh one. The outcome is persisted either way.
    async fn search_stage(&self, item: &WorkItem) -> Result<Vec<SearchEntry>> {
        let previous = self.storage.get_search_result(&item.id).await?;
        if let Some(record) = previous
            .as_ref()
            .filter(|r| r.status == RecordStatus::Completed && !r.entries.is_empty())
        {
            info!(results = record.entries.len(), "reusing search results");
            return Ok(record.entries.clone());
        }

        let query = formulate_query(&self.llm, item).await?;
        self.progress
            .detail(&item.id, &format!("query: {query}"));

        let now = Utc::now();
        let mut record = SearchResultRecord {
            id: previous.as_ref().map_or_else(new_id, |r| r.id.clone()),
            work_item_id: item.id.clone(),
            query: query.clone(),
            fallback_query: None,
            language: item.language.clone(),
            entries: Vec::new(),
            total_results: None,
            status: RecordStatus::Generating,
            error_message: None,
            created_at: previous.as_ref().map_or(now, |r| r.created_at),
            updated_at: now,
        };

        let result = self
            .search
            .search_with_fallback(&query, &item.topic, &item.language)
            .await;

        record.updated_at = Utc::now();
        match result {
            Ok(found) => {
                record.fallback_query = found.fallback_query;
                record.total_results = found.outcome.total_results;
                record.entries = found.outcome.entries;
                record.status = RecordStatus::Completed;
                self.storage.upsert_search_result(&record).await?;
                info!(
                    results = record.entries.len(),
                    fallback = record.fallback_query.is_some(),
                    "search completed"
                );
                Ok(record.entries)
            }
            Err(e) => {
                if let PapermillError::NoSearchResults { fallback_query, .. } = &e {
                    record.fallback_query = Some(fallback_query.clone());
                }
                record.status = RecordStatus::Failed;
                record.error_message = Some(e.to_string());
                self.storage.upsert_search_result(&record).await?;
                Err(e)
            }
        }
    }

    /// Scrape the customer's source hints first, then the search results.
    async fn scrape_stage(&self, item: &WorkItem, entries: &[SearchEntry]) -> Result<()> {
        let mut targets: Vec<SearchEntry> = item
            .source_hints
            .iter()
            .map(|hint| SearchEntry {
                title: hint.clone(),
                link: hint.clone(),
                snippet: String::new(),
            })
            .collect();
        targets.extend_from_slice(entries);

        let summary = self
            .scraper
            .scrape_all(&self.storage, &item.id, &targets)
            .await?;
        self.progress.detail(
            &item.id,
            &format!(
                "{} scraped, {} failed, {} reused",
                summary.completed, summary.failed, summary.skipped
            ),
        );
        for (url, err) in &summary.errors {
            debug!(url = %url, error = %err, "scrape failure");
        }
        Ok(())
    }

    async fn structure_stage(
        &self,
        item: &WorkItem,
        sources: &[ScrapedSource],
    ) -> Result<StructureRecord> {
        if item.content_kind.is_academic() {
            let generator =
                AcademicGenerator::new(&self.storage, &self.llm, &self.generation, item)?;
            let mut work = generator.load_or_create().await?;
            generator.ensure_toc(&mut work, sources).await?;
            Ok(StructureRecord::Academic(work))
        } else {
            let outline =
                generate_outline(&self.storage, &self.llm, &self.generation, item, sources).await?;
            Ok(StructureRecord::Generic(outline))
        }
    }

    /// Produce the deliverable text for the structure's shape.
    async fn content_stage(
        &self,
        item: &WorkItem,
        structure: StructureRecord,
        sources: &[ScrapedSource],
    ) -> Result<String> {
        match structure {
            StructureRecord::Generic(outline) => {
                let content = generate_content(
                    &self.storage,
                    &self.llm,
                    &self.generation,
                    item,
                    &outline,
                    sources,
                )
                .await?;
                Ok(content.body)
            }
            StructureRecord::Academic(mut work) => {
                let generator =
                    AcademicGenerator::new(&self.storage, &self.llm, &self.generation, item)?;
                generator.write(&mut work, sources).await?;
                work.final_text.ok_or_else(|| {
                    PapermillError::validation("academic work completed without a final text")
                })
            }
        }
    }

    /// Deliver the text to the order item and close the order once every
    /// item of it is done.
    async fn sync_order(&self, item: &WorkItem, text: &str) -> Result<()> {
        if let Some(order_item_id) = item.order_item_id.as_deref() {
            self.orders.complete_item(order_item_id, text).await?;
        }
        if !item.content_kind.is_academic() {
            self.storage.mark_content_delivered(&item.id).await?;
        }

        let Some(order_id) = item.order_id.as_deref() else {
            return Ok(());
        };
        if self.orders.order_finished(order_id).await?
            && self.orders.mark_order_completed(order_id).await?
        {
            self.notifier.order_completed(order_id).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Move the item forward. A stage it is already past is left alone, so
    /// a resumed run never moves the status back.
    async fn advance(&self, item: &WorkItem, next: WorkItemStatus) -> Result<()> {
        let current = self.storage.require_work_item(&item.id).await?.status;
        if current == next || !current.can_transition_to(next) {
            debug!(from = %current, to = %next, "status unchanged");
            return Ok(());
        }
        self.storage.update_work_item_status(&item.id, next).await?;
        self.progress.stage(&item.id, next);
        Ok(())
    }

    async fn record_failure(&self, item: &WorkItem, err: &PapermillError) {
        let message = err.to_string();
        error!(error = %message, "pipeline failed");
        if let Err(e) = self.persist_failure(item, &message).await {
            warn!(error = %e, "could not record pipeline failure");
        }
    }

    async fn persist_failure(&self, item: &WorkItem, message: &str) -> Result<()> {
        if self.storage.get_search_result(&item.id).await?.is_none() {
            let now = Utc::now();
            let stub = SearchResultRecord {
                id: new_id(),
                work_item_id: item.id.clone(),
                query: String::new(),
                fallback_query: None,
                language: item.language.clone(),
                entries: Vec::new(),
                total_results: None,
                status: RecordStatus::Failed,
                error_message: Some(message.to_string()),
                created_at: now,
                updated_at: now,
            };
            self.storage.upsert_search_result(&stub).await?;
        }
        self.storage
            .fail_work_item(&item.id, WorkItemStatus::Cancelled, message)
            .await
    }

    async fn completed_outcome(&self, item: &WorkItem, start: Instant) -> Result<RunOutcome> {
        let text = match self.storage.get_structure(&item.id).await? {
            Some(StructureRecord::Academic(work)) => work.final_text.unwrap_or_default(),
            _ => self
                .storage
                .get_generated_content(&item.id)
                .await?
                .map(|c| c.body)
                .unwrap_or_default(),
        };
        let selected = self.storage.list_selected_sources(&item.id).await?.len();
        Ok(RunOutcome {
            work_item_id: item.id.clone(),
            content_kind: item.content_kind,
            char_count: text.chars().count(),
            selected_sources: selected,
            already_completed: true,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::PromptKind;
    use crate::testing::{ScriptedCompletion, test_llm, test_storage};
    use papermill_shared::{NewWorkItem, OrderStatus};
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCRAPED_TEXT: &str = "Heat pumps in older buildings need careful sizing. \
        Insulation comes first, then radiators are checked for low flow temperatures.";

    #[derive(Default)]
    struct RecordingNotifier {
        notified: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn order_completed(&self, order_id: &str) -> Result<()> {
            self.notified.lock().unwrap().push(order_id.to_string());
            Ok(())
        }
    }

    struct Harness {
        search_server: MockServer,
        scraper_server: MockServer,
        scripted: Arc<ScriptedCompletion>,
        notifier: Arc<RecordingNotifier>,
        pipeline: Pipeline,
    }

    async fn harness() -> Harness {
        let search_server = MockServer::start().await;
        let scraper_server = MockServer::start().await;
        let scripted = Arc::new(ScriptedCompletion::fluent());
        let notifier = Arc::new(RecordingNotifier::default());

        let search = SearchClient::new(SearchOptions {
            base_url: format!("{}/customsearch/v1", search_server.uri()),
            api_key: "test-key".into(),
            engine_id: "test-cx".into(),
            page_size: 10,
            max_results: 15,
            page_delay: Duration::ZERO,
            timeout_secs: 5,
        })
        .unwrap();
        let scraper = ScraperClient::new(ScraperOptions {
            base_url: scraper_server.uri(),
            timeout: Duration::from_secs(5),
            delay: Duration::ZERO,
        })
        .unwrap();

        let pipeline = Pipeline::new(
            Arc::new(test_storage().await),
            test_llm(&scripted),
            search,
            scraper,
            GenerationConfig::default(),
        )
        .with_notifier(notifier.clone());

        Harness {
            search_server,
            scraper_server,
            scripted,
            notifier,
            pipeline,
        }
    }

    fn search_page(count: usize) -> serde_json::Value {
        let items: Vec<_> = (1..=count)
            .map(|i| {
                json!({
                    "title": format!("Result {i}"),
                    "link": format!("https://example.com/page-{i}"),
                    "snippet": "snippet"
                })
            })
            .collect();
        json!({ "searchInformation": { "totalResults": count.to_string() }, "items": items })
    }

    async fn serve_search(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn serve_scrapes(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": SCRAPED_TEXT })))
            .mount(server)
            .await;
    }

    async fn ordered_item(storage: &Storage, content_type: &str, target_length: u32) -> WorkItem {
        let order = storage.create_order(Some("cust-1")).await.unwrap();
        let order_item = storage.create_order_item(&order.id).await.unwrap();
        let item = NewWorkItem {
            topic: "Heat pumps in pre-war apartment buildings".into(),
            target_length,
            content_type: content_type.into(),
            language: "en".into(),
            order_id: Some(order.id),
            order_item_id: Some(order_item.id),
            ..Default::default()
        }
        .into_work_item()
        .unwrap();
        storage.create_work_item(&item).await.unwrap();
        item
    }

    #[tokio::test]
    async fn short_article_end_to_end() {
        let h = harness().await;
        serve_search(&h.search_server, search_page(5)).await;
        serve_scrapes(&h.scraper_server).await;
        let storage = h.pipeline.storage();
        let item = ordered_item(storage, "article", 1000).await;

        let outcome = h.pipeline.run(&item.id).await.unwrap();
        assert!((800..=1200).contains(&outcome.char_count), "{}", outcome.char_count);
        assert_eq!(outcome.selected_sources, 3);

        let stored = storage.require_work_item(&item.id).await.unwrap();
        assert_eq!(stored.status, WorkItemStatus::Completed);

        let search = storage.get_search_result(&item.id).await.unwrap().unwrap();
        assert_eq!(search.status, RecordStatus::Completed);
        assert_eq!(search.entries.len(), 5);
        assert_eq!(search.query, "heat pump retrofit efficiency");

        let Some(StructureRecord::Generic(outline)) = storage.get_structure(&item.id).await.unwrap()
        else {
            panic!("expected a generic outline");
        };
        assert_eq!(outline.header_count, 3);
        assert_eq!(h.scripted.requests_of(PromptKind::Content).len(), 1);

        let content = storage.get_generated_content(&item.id).await.unwrap().unwrap();
        assert!(content.delivered);

        let order_item = storage
            .get_order_item(item.order_item_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order_item.status, OrderStatus::Completed);
        assert_eq!(order_item.content.as_deref(), Some(content.body.as_str()));

        let order_id = item.order_id.clone().unwrap();
        let order = storage.get_order(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(*h.notifier.notified.lock().unwrap(), vec![order_id]);

        // Running a completed item again does no work and does not notify twice.
        let again = h.pipeline.run(&item.id).await.unwrap();
        assert!(again.already_completed);
        assert_eq!(again.char_count, outcome.char_count);
        assert_eq!(h.scripted.requests_of(PromptKind::Content).len(), 1);
        assert_eq!(h.notifier.notified.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_results_cancels_after_fallback() {
        let h = harness().await;
        serve_search(&h.search_server, json!({ "searchInformation": { "totalResults": "0" } }))
            .await;
        let storage = h.pipeline.storage();
        let item = ordered_item(storage, "article", 3000).await;

        let err = h.pipeline.run(&item.id).await.unwrap_err();
        assert!(matches!(err, PapermillError::NoSearchResults { .. }));

        let requests = h.search_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(
            requests[1]
                .url
                .query_pairs()
                .any(|(k, v)| k == "q" && v == "Heat pumps in pre-war apartment")
        );

        let stored = storage.require_work_item(&item.id).await.unwrap();
        assert_eq!(stored.status, WorkItemStatus::Cancelled);
        assert!(!stored.error_message.unwrap_or_default().is_empty());

        let search = storage.get_search_result(&item.id).await.unwrap().unwrap();
        assert_eq!(search.status, RecordStatus::Failed);
        assert_eq!(
            search.fallback_query.as_deref(),
            Some("Heat pumps in pre-war apartment")
        );
        assert!(h.scraper_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn formulation_failure_leaves_search_stub() {
        let h = harness().await;
        h.scripted.reply(PromptKind::SearchQuery, "   ");
        let storage = h.pipeline.storage();
        let item = ordered_item(storage, "article", 3000).await;

        h.pipeline.run(&item.id).await.unwrap_err();

        let search = storage.get_search_result(&item.id).await.unwrap().unwrap();
        assert_eq!(search.status, RecordStatus::Failed);
        assert!(search.error_message.is_some());
        let stored = storage.require_work_item(&item.id).await.unwrap();
        assert_eq!(stored.status, WorkItemStatus::Cancelled);
    }

    #[tokio::test]
    async fn reopened_item_resumes_after_completed_stages() {
        let h = harness().await;
        serve_search(&h.search_server, search_page(4)).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&h.scraper_server)
            .await;
        let storage = h.pipeline.storage();
        let item = ordered_item(storage, "article", 4000).await;

        let err = h.pipeline.run(&item.id).await.unwrap_err();
        assert!(matches!(err, PapermillError::NoUsableSources { attempted: 4 }));

        // A cancelled item is not run again until it is reopened.
        let refused = h.pipeline.run(&item.id).await.unwrap_err();
        assert!(refused.to_string().contains("reopen"));

        h.scraper_server.reset().await;
        serve_scrapes(&h.scraper_server).await;
        storage.reopen_work_item(&item.id).await.unwrap();

        let outcome = h.pipeline.run(&item.id).await.unwrap();
        assert!(!outcome.already_completed);
        assert_eq!(h.scripted.requests_of(PromptKind::SearchQuery).len(), 1);
        assert_eq!(h.search_server.received_requests().await.unwrap().len(), 1);
        assert_eq!(
            storage.require_work_item(&item.id).await.unwrap().status,
            WorkItemStatus::Completed
        );
    }

    #[tokio::test]
    async fn masters_thesis_goes_through_the_academic_path() {
        let h = harness().await;
        serve_search(&h.search_server, search_page(6)).await;
        serve_scrapes(&h.scraper_server).await;
        let storage = h.pipeline.storage();
        let item = ordered_item(storage, "praca magisterska", 40_000).await;

        h.pipeline.run(&item.id).await.unwrap();

        let Some(StructureRecord::Academic(work)) = storage.get_structure(&item.id).await.unwrap()
        else {
            panic!("expected an academic work");
        };
        assert_eq!(work.work_type.as_str(), "mgr");
        assert_eq!(work.table_of_contents.len(), 4);
        assert!(work.is_completed());
        assert!(storage.get_outline(&item.id).await.unwrap().is_none());
        assert!(h.scripted.requests_of(PromptKind::Outline).is_empty());

        let query = &h.scripted.requests_of(PromptKind::SearchQuery)[0];
        assert!(query.prompt.contains("Heat pumps"));
        let search = storage.get_search_result(&item.id).await.unwrap().unwrap();
        assert!(search.query.ends_with("(site:edu OR site:gov OR filetype:pdf)"));

        let order_item = storage
            .get_order_item(item.order_item_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order_item.content, work.final_text);
    }

    #[tokio::test]
    async fn source_hints_are_scraped_first() {
        let h = harness().await;
        serve_search(&h.search_server, search_page(3)).await;
        serve_scrapes(&h.scraper_server).await;
        let storage = h.pipeline.storage();
        let item = NewWorkItem {
            topic: "Heat pumps".into(),
            target_length: 2000,
            content_type: "blog post".into(),
            language: "en".into(),
            source_hints: vec!["https://example.org/customer-notes".into()],
            ..Default::default()
        }
        .into_work_item()
        .unwrap();
        storage.create_work_item(&item).await.unwrap();

        h.pipeline.run(&item.id).await.unwrap();

        let scraped = storage.list_scraped_sources(&item.id).await.unwrap();
        assert_eq!(scraped.len(), 4);
        assert_eq!(scraped[0].url, "https://example.org/customer-notes");
        assert_eq!(scraped[0].position, 1);
    }
}
