// Trait abstractions for the pipeline executor's dependencies.
//
// ProgressSink hides the pub/sub transport, SearchProvider hides the search
// API, ScrapeService hides whether scraping runs in-process or through the
// task broker. Production wiring injects the Redis/HTTP implementations;
// tests inject the mocks in `testing` — no network, no Redis.

use async_trait::async_trait;

use trawler_common::events::ProgressEvent;
use trawler_common::types::{ScrapeResult, SearchHit};
use trawler_queue::ProgressBus;

// ---------------------------------------------------------------------------
// ProgressSink — where progress events go
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Deliver one event for a job. Must not fail the pipeline: transports
    /// log and swallow their own errors.
    async fn publish(&self, job_id: &str, event: &ProgressEvent);
}

#[async_trait]
impl ProgressSink for ProgressBus {
    async fn publish(&self, job_id: &str, event: &ProgressEvent) {
        ProgressBus::publish(self, job_id, event).await;
    }
}

// ---------------------------------------------------------------------------
// SearchProvider — ranked web search
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query. Provider failures yield an empty list, never an error.
    async fn search(&self, query: &str, num_results: usize) -> Vec<SearchHit>;
}

// ---------------------------------------------------------------------------
// ScrapeService — the standalone/queue seam
// ---------------------------------------------------------------------------

/// Single operation the executor needs from the scraping tier. The two
/// production bindings are [`crate::scrape::DirectScrapeService`] (in-process
/// HTTP call to the worker pool) and [`crate::scrape::QueuedScrapeService`]
/// (broker round trip); the executor cannot tell them apart.
#[async_trait]
pub trait ScrapeService: Send + Sync {
    async fn scrape(
        &self,
        job_id: &str,
        urls: &[String],
        primary_query: &str,
        original_query: &str,
    ) -> Vec<ScrapeResult>;
}
