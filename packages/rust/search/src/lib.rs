//! Web search client for the Google Custom Search JSON API.
//!
//! Results are requested in pages (10 per request at most) until the result
//! cap is reached, pausing between pages to respect the API's rate limits.
//! A short page means the engine has nothing more; a failing page after the
//! first one ends the pagination with whatever was collected so far.

mod response;

use std::time::Duration;

use papermill_shared::{PapermillError, Result, SearchConfig, SearchEntry, read_env_secret};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use response::SearchResponse;

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("papermill/", env!("CARGO_PKG_VERSION"));

/// The API refuses `num` above this.
const API_MAX_PAGE_SIZE: u32 = 10;

/// Words kept when simplifying a topic into a fallback query.
const FALLBACK_QUERY_WORDS: usize = 5;

/// Default timeout in seconds for one page request.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime configuration for the search client.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub base_url: String,
    pub api_key: String,
    /// Custom search engine id (`cx`).
    pub engine_id: String,
    pub page_size: u32,
    pub max_results: u32,
    pub page_delay: Duration,
    pub timeout_secs: u64,
}

impl SearchOptions {
    /// Build options from the `[search]` config section, reading the
    /// credentials from the environment.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            api_key: read_env_secret(&config.api_key_env, "search API")?,
            engine_id: read_env_secret(&config.engine_id_env, "search engine")?,
            page_size: config.page_size,
            max_results: config.max_results,
            page_delay: Duration::from_millis(config.page_delay_ms),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Entries gathered for one query.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub entries: Vec<SearchEntry>,
    /// Engine's estimate of the total hit count.
    pub total_results: Option<u64>,
    pub pages_fetched: u32,
}

/// Outcome of a search that may have fallen back to a simplified query.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub query: String,
    /// Set when the first query came back empty or failed.
    pub fallback_query: Option<String>,
    pub outcome: SearchOutcome,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Paginating client for the search API.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    opts: SearchOptions,
}

impl SearchClient {
    pub fn new(opts: SearchOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| PapermillError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, opts })
    }

    /// Run one query, collecting up to `max_results` entries across pages.
    #[instrument(skip_all, fields(query = %query, language = %language))]
    pub async fn search(&self, query: &str, language: &str) -> Result<SearchOutcome> {
        let page_size = self.opts.page_size.clamp(1, API_MAX_PAGE_SIZE);
        let max_results = self.opts.max_results as usize;
        let mut outcome = SearchOutcome::default();

        while outcome.entries.len() < max_results {
            if outcome.pages_fetched > 0 && !self.opts.page_delay.is_zero() {
                tokio::time::sleep(self.opts.page_delay).await;
            }

            let remaining = (max_results - outcome.entries.len()) as u32;
            let num = page_size.min(remaining);
            // The API's result offset is 1-based.
            let start = outcome.entries.len() as u32 + 1;

            let page = match self.fetch_page(query, language, start, num).await {
                Ok(page) => page,
                Err(e) if outcome.pages_fetched == 0 => return Err(e),
                Err(e) => {
                    warn!(error = %e, start, "search page failed, keeping earlier pages");
                    break;
                }
            };
            outcome.pages_fetched += 1;

            if outcome.total_results.is_none() {
                outcome.total_results = page.total_results();
            }

            let entries = page.into_entries();
            let received = entries.len();
            debug!(start, received, "search page received");
            outcome.entries.extend(entries);

            if received < num as usize {
                break;
            }
        }

        outcome.entries.truncate(max_results);
        info!(
            results = outcome.entries.len(),
            pages = outcome.pages_fetched,
            "search complete"
        );
        Ok(outcome)
    }

    /// Search with `query`; if that yields nothing, retry once with the
    /// first words of `topic`.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn search_with_fallback(
        &self,
        query: &str,
        topic: &str,
        language: &str,
    ) -> Result<FallbackOutcome> {
        match self.search(query, language).await {
            Ok(outcome) if !outcome.entries.is_empty() => {
                return Ok(FallbackOutcome {
                    query: query.to_string(),
                    fallback_query: None,
                    outcome,
                });
            }
            Ok(_) => info!("no results, retrying with simplified query"),
            Err(e) => warn!(error = %e, "search failed, retrying with simplified query"),
        }

        let fallback = simplify_query(topic);
        let outcome = self.search(&fallback, language).await?;
        if outcome.entries.is_empty() {
            return Err(PapermillError::NoSearchResults {
                query: query.to_string(),
                fallback_query: fallback,
            });
        }

        Ok(FallbackOutcome {
            query: query.to_string(),
            fallback_query: Some(fallback),
            outcome,
        })
    }

    async fn fetch_page(
        &self,
        query: &str,
        language: &str,
        start: u32,
        num: u32,
    ) -> Result<SearchResponse> {
        let lr = format!("lang_{language}");
        let start = start.to_string();
        let num = num.to_string();

        let response = self
            .client
            .get(&self.opts.base_url)
            .query(&[
                ("key", self.opts.api_key.as_str()),
                ("cx", self.opts.engine_id.as_str()),
                ("q", query),
                ("hl", language),
                ("lr", lr.as_str()),
                ("start", start.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PapermillError::Network(format!("search request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PapermillError::Network(format!(
                "search API returned HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| PapermillError::parse(format!("search response: {e}")))
    }
}

/// First words of the raw topic, used when the formulated query finds nothing.
pub fn simplify_query(topic: &str) -> String {
    topic
        .split_whitespace()
        .take(FALLBACK_QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn opts(server: &MockServer) -> SearchOptions {
        SearchOptions {
            base_url: format!("{}/customsearch/v1", server.uri()),
            api_key: "test-key".into(),
            engine_id: "test-cx".into(),
            page_size: 10,
            max_results: 15,
            page_delay: Duration::ZERO,
            timeout_secs: 5,
        }
    }

    fn page(prefix: &str, count: usize, total: &str) -> serde_json::Value {
        let items: Vec<_> = (0..count)
            .map(|i| {
                json!({
                    "title": format!("{prefix} result {i}"),
                    "link": format!("https://example.com/{prefix}/{i}"),
                    "snippet": "snippet"
                })
            })
            .collect();
        json!({ "searchInformation": { "totalResults": total }, "items": items })
    }

    #[test]
    fn simplify_keeps_five_words() {
        assert_eq!(
            simplify_query("  The impact of remote work on  urban housing markets "),
            "The impact of remote work"
        );
        assert_eq!(simplify_query("short topic"), "short topic");
    }

    #[tokio::test]
    async fn paginates_up_to_cap() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("start", "1"))
            .and(query_param("num", "10"))
            .and(query_param("lr", "lang_en"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page("p1", 10, "1234")))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(query_param("start", "11"))
            .and(query_param("num", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page("p2", 5, "1234")))
            .expect(1)
            .mount(&server)
            .await;

        let client = SearchClient::new(opts(&server)).unwrap();
        let outcome = client.search("heat pumps", "en").await.unwrap();

        assert_eq!(outcome.entries.len(), 15);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(outcome.total_results, Some(1234));
        assert_eq!(outcome.entries[10].title, "p2 result 0");
    }

    #[tokio::test]
    async fn short_page_stops_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page("p1", 4, "4")))
            .expect(1)
            .mount(&server)
            .await;

        let client = SearchClient::new(opts(&server)).unwrap();
        let outcome = client.search("niche topic", "en").await.unwrap();
        assert_eq!(outcome.entries.len(), 4);
        assert_eq!(outcome.pages_fetched, 1);
    }

    #[tokio::test]
    async fn later_page_error_keeps_earlier_results() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page("p1", 10, "99")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("start", "11"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = SearchClient::new(opts(&server)).unwrap();
        let outcome = client.search("q", "en").await.unwrap();
        assert_eq!(outcome.entries.len(), 10);
    }

    #[tokio::test]
    async fn first_page_error_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = SearchClient::new(opts(&server)).unwrap();
        let err = client.search("q", "en").await.unwrap_err();
        assert!(matches!(err, PapermillError::Network(_)));
    }

    #[tokio::test]
    async fn falls_back_to_simplified_topic() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("q", "very specific formulated query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "searchInformation": { "totalResults": "0" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "Zastosowanie pomp ciepła w budynkach"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page("fb", 3, "3")))
            .expect(1)
            .mount(&server)
            .await;

        let client = SearchClient::new(opts(&server)).unwrap();
        let result = client
            .search_with_fallback(
                "very specific formulated query",
                "Zastosowanie pomp ciepła w budynkach wielorodzinnych z lat 70",
                "pl",
            )
            .await
            .unwrap();

        assert_eq!(
            result.fallback_query.as_deref(),
            Some("Zastosowanie pomp ciepła w budynkach")
        );
        assert_eq!(result.outcome.entries.len(), 3);
    }

    #[tokio::test]
    async fn both_attempts_empty_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let client = SearchClient::new(opts(&server)).unwrap();
        let err = client
            .search_with_fallback("q", "some topic", "en")
            .await
            .unwrap_err();
        match err {
            PapermillError::NoSearchResults {
                query,
                fallback_query,
            } => {
                assert_eq!(query, "q");
                assert_eq!(fallback_query, "some topic");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
