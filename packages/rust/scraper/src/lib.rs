//! Scraper Client for the page-text extraction microservice.
//!
//! Search-result links are scraped one at a time: each URL gets its own
//! [`ScrapedSource`](papermill_shared::ScrapedSource) record, moved to
//! `scraping` before the request and to `completed` or `failed` after it.
//! A failing URL never aborts the batch; only a batch where nothing
//! succeeded is an error.

mod guard;

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use papermill_shared::{PapermillError, Result, ScrapeStatus, ScraperConfig, SearchEntry};
use papermill_storage::Storage;

/// User-Agent string for scrape requests.
const USER_AGENT: &str = concat!("papermill/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScraperOptions {
    /// Base URL of the scraping service; requests go to `{base_url}/scrape`.
    pub base_url: String,
    pub timeout: Duration,
    /// Pause between two scrape requests.
    pub delay: Duration,
}

impl From<&ScraperConfig> for ScraperOptions {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Outcome of one scrape batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// URLs scraped successfully in this run.
    pub completed: usize,
    pub failed: usize,
    /// URLs already completed by an earlier run.
    pub skipped: usize,
    /// Repeated links within the batch.
    pub duplicates: usize,
    /// (url, error) for every failure.
    pub errors: Vec<(String, String)>,
}

impl ScrapeSummary {
    /// Sources usable for generation after this batch.
    pub fn usable(&self) -> usize {
        self.completed + self.skipped
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Sequential client for the scraping service.
#[derive(Debug, Clone)]
pub struct ScraperClient {
    client: Client,
    opts: ScraperOptions,
}

impl ScraperClient {
    pub fn new(opts: ScraperOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(opts.timeout)
            .build()
            .map_err(|e| PapermillError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, opts })
    }

    /// Scrape every entry in rank order, persisting one record per URL.
    ///
    /// Fails with [`PapermillError::NoUsableSources`] when no URL ends up
    /// completed, counting ones completed by earlier runs.
    #[instrument(skip_all, fields(work_item_id = %work_item_id, urls = entries.len()))]
    pub async fn scrape_all(
        &self,
        storage: &Storage,
        work_item_id: &str,
        entries: &[SearchEntry],
    ) -> Result<ScrapeSummary> {
        let mut summary = ScrapeSummary::default();
        let mut seen = HashSet::new();
        let mut requested_before = false;

        for (index, entry) in entries.iter().enumerate() {
            let position = index as u32 + 1;

            if !seen.insert(entry.link.trim().to_string()) {
                summary.duplicates += 1;
                continue;
            }

            let existing = storage
                .get_scraped_source_by_url(work_item_id, &entry.link)
                .await?;
            if existing.is_some_and(|s| s.status == ScrapeStatus::Completed) {
                debug!(url = %entry.link, "already scraped, skipping");
                summary.skipped += 1;
                continue;
            }

            let title = (!entry.title.is_empty()).then_some(entry.title.as_str());
            let record = storage
                .begin_scrape(work_item_id, &entry.link, title, position)
                .await?;

            let target = match guard::vet_target(&entry.link) {
                Ok(url) => url,
                Err(reason) => {
                    warn!(url = %entry.link, %reason, "skipping unusable link");
                    storage.fail_scrape(&record.id, &reason).await?;
                    summary.failed += 1;
                    summary.errors.push((entry.link.clone(), reason));
                    continue;
                }
            };

            if requested_before && !self.opts.delay.is_zero() {
                tokio::time::sleep(self.opts.delay).await;
            }
            requested_before = true;

            match self.fetch_text(target.as_str()).await {
                Ok(text) => {
                    let hash = papermill_text::content_hash(&text);
                    storage.complete_scrape(&record.id, &text, &hash).await?;
                    debug!(url = %entry.link, chars = papermill_text::char_count(&text), "scraped");
                    summary.completed += 1;
                }
                Err(e) => {
                    warn!(url = %entry.link, error = %e, "scrape failed");
                    let message = e.to_string();
                    storage.fail_scrape(&record.id, &message).await?;
                    summary.failed += 1;
                    summary.errors.push((entry.link.clone(), message));
                }
            }
        }

        info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            "scrape batch finished"
        );

        if summary.usable() == 0 {
            return Err(PapermillError::NoUsableSources {
                attempted: summary.failed,
            });
        }
        Ok(summary)
    }

    /// Ask the service for one page's text and normalize it.
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let endpoint = format!("{}/scrape", self.opts.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&endpoint)
            .json(&ScrapeRequest { url })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PapermillError::Network(format!("scrape timed out after {:?}", self.opts.timeout))
                } else {
                    PapermillError::Network(format!("scrape request: {e}"))
                }
            })?;

        let status = response.status();
        let body: Option<ScrapeResponse> = response.json().await.ok();

        if !status.is_success() {
            let detail = body.and_then(|b| b.error).unwrap_or_default();
            return Err(PapermillError::Network(format!(
                "scraper returned HTTP {status} {detail}"
            )
            .trim_end()
            .to_string()));
        }

        let body = body.ok_or_else(|| PapermillError::parse("scraper response is not JSON"))?;
        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            return Err(PapermillError::Network(format!("scraper: {error}")));
        }

        let raw = body.text.unwrap_or_default();
        let text = papermill_text::normalize_scraped(&raw)?;
        if text.is_empty() {
            return Err(PapermillError::validation("scraper returned no text"));
        }
        Ok(text)
    }
}
