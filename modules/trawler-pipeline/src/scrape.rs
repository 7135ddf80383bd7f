//! Scraper callback adapter — hides whether scraping runs in-process or
//! through the task broker.
//!
//! [`DirectScrapeService`] calls the scrape worker pool's HTTP API and waits
//! for the batch. [`QueuedScrapeService`] enqueues a `scrape_content` task
//! and blocks on the broker's reply channel. Both normalize the result into
//! a flat list of [`ScrapeResult`], because three envelope shapes circulate:
//! `{data: {results: […]}}`, `{results: […]}`, and a bare list.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use scrape_client::{ScrapeApiClient, ScrapeBatchRequest};
use trawler_common::types::ScrapeResult;
use trawler_queue::{ScrapeContentTask, TaskBroker, SCRAPER_QUEUE, SCRAPE_CONTENT_TASK};

use crate::traits::ScrapeService;

// ---------------------------------------------------------------------------
// Envelope normalization
// ---------------------------------------------------------------------------

/// Flatten any of the three permissible envelope shapes into a result list.
/// Anything else normalizes to empty.
pub fn normalize_scrape_payload(payload: &serde_json::Value) -> Vec<ScrapeResult> {
    let results = payload
        .get("data")
        .and_then(|data| data.get("results"))
        .or_else(|| payload.get("results"))
        .unwrap_or(payload);

    match results {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| match serde_json::from_value(item.clone()) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable scrape result");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Log the worker pool's batch statistics when the envelope carries them.
fn log_envelope_stats(payload: &serde_json::Value) {
    if let Some(stats) = payload.get("statistics") {
        info!(
            successful = stats["successful_scrapes"].as_u64().unwrap_or(0),
            requested = stats["urls_requested"].as_u64().unwrap_or(0),
            tables = stats["total_tables_found"].as_u64().unwrap_or(0),
            avg_score = stats["average_relevance_score"].as_f64().unwrap_or(0.0),
            "Scrape batch statistics"
        );
    }
    if let Some(timing) = payload.get("timing") {
        info!(
            scrape_seconds = timing["scrape_seconds"].as_f64().unwrap_or(0.0),
            processing_seconds = timing["processing_seconds"].as_f64().unwrap_or(0.0),
            total_seconds = payload["total_duration_seconds"].as_f64().unwrap_or(0.0),
            "Scrape batch timing"
        );
    }
}

// ---------------------------------------------------------------------------
// Direct binding — in-process HTTP call to the worker pool
// ---------------------------------------------------------------------------

pub struct DirectScrapeService {
    client: ScrapeApiClient,
    chunk_size: u32,
    concurrency: u32,
}

impl DirectScrapeService {
    pub fn new(client: ScrapeApiClient, chunk_size: u32, concurrency: u32) -> Self {
        Self {
            client,
            chunk_size,
            concurrency,
        }
    }
}

#[async_trait]
impl ScrapeService for DirectScrapeService {
    async fn scrape(
        &self,
        job_id: &str,
        urls: &[String],
        primary_query: &str,
        _original_query: &str,
    ) -> Vec<ScrapeResult> {
        info!(job_id, urls = urls.len(), "Scraping directly via worker pool API");

        let request = ScrapeBatchRequest {
            urls: urls.to_vec(),
            query: primary_query.to_string(),
            chunk_size: self.chunk_size,
            concurrency: self.concurrency,
        };

        match self.client.scrape_and_extract(&request).await {
            Ok(payload) => {
                log_envelope_stats(&payload);
                normalize_scrape_payload(&payload)
            }
            Err(e) => {
                warn!(job_id, error = %e, "Scrape batch failed, recording per-url errors");
                urls.iter()
                    .map(|url| ScrapeResult::failed(url, e.to_string()))
                    .collect()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Queue binding — broker round trip to a remote scrape worker
// ---------------------------------------------------------------------------

pub struct QueuedScrapeService {
    broker: TaskBroker,
    result_timeout: Duration,
}

impl QueuedScrapeService {
    pub fn new(broker: TaskBroker, result_timeout: Duration) -> Self {
        Self {
            broker,
            result_timeout,
        }
    }
}

#[async_trait]
impl ScrapeService for QueuedScrapeService {
    async fn scrape(
        &self,
        job_id: &str,
        urls: &[String],
        primary_query: &str,
        original_query: &str,
    ) -> Vec<ScrapeResult> {
        let task = ScrapeContentTask {
            job_id: job_id.to_string(),
            urls: urls.to_vec(),
            primary_query: primary_query.to_string(),
            original_query: original_query.to_string(),
        };

        let task_id = match self
            .broker
            .enqueue(SCRAPER_QUEUE, SCRAPE_CONTENT_TASK, &task)
            .await
        {
            Ok(task_id) => task_id,
            Err(e) => {
                warn!(job_id, error = %e, "Failed to enqueue scrape task");
                return Vec::new();
            }
        };

        info!(job_id, task_id, urls = urls.len(), "Scrape task enqueued, awaiting result");

        match self.broker.await_result(&task_id, self.result_timeout).await {
            Ok(Some(payload)) => {
                log_envelope_stats(&payload);
                normalize_scrape_payload(&payload)
            }
            Ok(None) => {
                warn!(job_id, task_id, "Scrape result wait timed out");
                Vec::new()
            }
            Err(e) => {
                warn!(job_id, task_id, error = %e, "Scrape result wait failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_json(url: &str) -> serde_json::Value {
        serde_json::json!({
            "url": url,
            "best_chunk": "chunk text",
            "score": 0.8,
            "chunk_index": 2,
            "total_chunks": 7,
            "word_count": 512,
            "tables": [],
            "tables_count": 0
        })
    }

    #[test]
    fn normalizes_nested_data_results_shape() {
        let payload = serde_json::json!({"data": {"results": [result_json("https://a")]}});
        let results = normalize_scrape_payload(&payload);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a");
    }

    #[test]
    fn normalizes_results_shape() {
        let payload = serde_json::json!({
            "ok": true,
            "query": "q",
            "results": [result_json("https://a"), result_json("https://b")]
        });
        let results = normalize_scrape_payload(&payload);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn normalizes_bare_list_shape() {
        let payload = serde_json::json!([result_json("https://a")]);
        let results = normalize_scrape_payload(&payload);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn garbage_normalizes_to_empty() {
        assert!(normalize_scrape_payload(&serde_json::json!("nope")).is_empty());
        assert!(normalize_scrape_payload(&serde_json::json!({"ok": false})).is_empty());
        assert!(normalize_scrape_payload(&serde_json::json!(42)).is_empty());
    }

    #[test]
    fn undecodable_entries_are_skipped() {
        let payload = serde_json::json!({
            "results": [result_json("https://a"), {"url": 17}]
        });
        let results = normalize_scrape_payload(&payload);
        assert_eq!(results.len(), 1);
    }
}
