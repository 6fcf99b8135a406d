//! Bounded concurrent execution of many pipelines.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::pipeline::{Pipeline, RunOutcome};

/// Per-item results of a batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<RunOutcome>,
    /// (work item id, error message)
    pub failed: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Run the pipeline for every id, at most `max_concurrent` at a time.
///
/// Each item runs in its own task; a failing or panicking item is recorded
/// in the summary and never stops its siblings. Repeated ids run once.
pub async fn run_batch(
    pipeline: Arc<Pipeline>,
    work_item_ids: Vec<String>,
    max_concurrent: usize,
) -> BatchSummary {
    let limit = max_concurrent.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks = JoinSet::new();

    let mut seen = HashSet::new();
    let ids: Vec<String> = work_item_ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();

    info!(items = ids.len(), max_concurrent = limit, "starting batch");

    for id in ids {
        let pipeline = pipeline.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    let run_id = id.clone();
                    let run = tokio::spawn(async move { pipeline.run(&run_id).await });
                    match run.await {
                        Ok(result) => result.map_err(|e| e.to_string()),
                        Err(e) => Err(format!("pipeline task panicked: {e}")),
                    }
                }
                Err(e) => Err(format!("worker pool closed: {e}")),
            };
            (id, result)
        });
    }

    let mut summary = BatchSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(outcome))) => summary.succeeded.push(outcome),
            Ok((id, Err(message))) => {
                warn!(work_item_id = %id, error = %message, "work item failed");
                summary.failed.push((id, message));
            }
            Err(e) => warn!(error = %e, "batch worker aborted"),
        }
    }

    info!(
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        "batch finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::PromptKind;
    use crate::testing::{ScriptedCompletion, test_llm, test_storage};
    use papermill_scraper::{ScraperClient, ScraperOptions};
    use papermill_search::{SearchClient, SearchOptions};
    use papermill_shared::{GenerationConfig, NewWorkItem, WorkItemStatus};
    use papermill_storage::Storage;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        storage: Arc<Storage>,
        pipeline: Arc<Pipeline>,
        // Keep the mock servers alive for the whole test.
        _search: MockServer,
        _scraper: MockServer,
    }

    /// Pipeline whose search finds three pages only for "heat pump retrofit".
    async fn harness(scripted: &Arc<ScriptedCompletion>) -> Harness {
        let search_server = MockServer::start().await;
        let scraper_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("q", "heat pump retrofit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "title": "A", "link": "https://example.com/a", "snippet": "" },
                    { "title": "B", "link": "https://example.com/b", "snippet": "" },
                    { "title": "C", "link": "https://example.com/c", "snippet": "" }
                ]
            })))
            .mount(&search_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&search_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "text": "Pumps move heat." })),
            )
            .mount(&scraper_server)
            .await;

        let storage = Arc::new(test_storage().await);
        let pipeline = Arc::new(Pipeline::new(
            storage.clone(),
            test_llm(scripted),
            SearchClient::new(SearchOptions {
                base_url: search_server.uri(),
                api_key: "k".into(),
                engine_id: "cx".into(),
                page_size: 10,
                max_results: 15,
                page_delay: Duration::ZERO,
                timeout_secs: 5,
            })
            .unwrap(),
            ScraperClient::new(ScraperOptions {
                base_url: scraper_server.uri(),
                timeout: Duration::from_secs(5),
                delay: Duration::ZERO,
            })
            .unwrap(),
            GenerationConfig::default(),
        ));

        Harness {
            storage,
            pipeline,
            _search: search_server,
            _scraper: scraper_server,
        }
    }

    async fn create_items(storage: &Storage, topics: &[&str]) -> Vec<String> {
        let mut ids = Vec::new();
        for topic in topics {
            let item = NewWorkItem {
                topic: (*topic).into(),
                target_length: 2000,
                content_type: "article".into(),
                language: "en".into(),
                ..Default::default()
            }
            .into_work_item()
            .unwrap();
            storage.create_work_item(&item).await.unwrap();
            ids.push(item.id);
        }
        ids
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_others() {
        // The model's query for the second item finds nothing.
        let scripted = Arc::new(ScriptedCompletion::fluent());
        scripted.respond(PromptKind::SearchQuery, |req| {
            if req.prompt.contains("Unfindable") {
                "nothing at all".into()
            } else {
                "heat pump retrofit".into()
            }
        });
        let h = harness(&scripted).await;
        let ids = create_items(
            &h.storage,
            &["Heat pumps", "Unfindable topic", "Heat pumps again"],
        )
        .await;

        let summary = run_batch(h.pipeline.clone(), ids.clone(), 2).await;
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.succeeded.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, ids[1]);

        let mut statuses = Vec::new();
        for id in &ids {
            statuses.push(h.storage.require_work_item(id).await.unwrap().status);
        }
        assert_eq!(
            statuses,
            vec![
                WorkItemStatus::Completed,
                WorkItemStatus::Cancelled,
                WorkItemStatus::Completed
            ]
        );
    }

    #[tokio::test]
    async fn panicking_item_is_reported_as_failed() {
        let scripted = Arc::new(ScriptedCompletion::fluent());
        scripted.respond(PromptKind::SearchQuery, |req| {
            if req.prompt.contains("Explosive") {
                panic!("model double blew up");
            }
            "heat pump retrofit".into()
        });
        let h = harness(&scripted).await;
        let ids = create_items(&h.storage, &["Heat pumps", "Explosive topic"]).await;

        let summary = run_batch(h.pipeline.clone(), ids.clone(), 2).await;
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.succeeded.len(), 1);
        assert_eq!(summary.succeeded[0].work_item_id, ids[0]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, ids[1]);
        assert!(summary.failed[0].1.contains("panicked"));
    }

    #[tokio::test]
    async fn repeated_ids_run_once() {
        let scripted = Arc::new(ScriptedCompletion::fluent());
        scripted.respond(PromptKind::SearchQuery, |_| "heat pump retrofit".into());
        let h = harness(&scripted).await;
        let ids = create_items(&h.storage, &["Heat pumps", "Heat pumps again"]).await;

        let repeated = vec![ids[0].clone(), ids[0].clone(), ids[1].clone(), ids[0].clone()];
        let summary = run_batch(h.pipeline.clone(), repeated, 4).await;
        assert_eq!(summary.total(), 2);
        assert!(summary.failed.is_empty());
        assert_eq!(scripted.requests_of(PromptKind::SearchQuery).len(), 2);
    }
}
