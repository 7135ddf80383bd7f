pub mod error;

pub use error::{Result, ScrapeClientError};

use std::time::Duration;

use tracing::debug;

/// Client for the scrape worker pool's `/scrape_and_extract` endpoint.
///
/// The pool renders each url in a headless browser, chunks the text, scores
/// chunks against `query`, and extracts tables. The response envelope is
/// returned raw — callers normalize it, because three historical shapes are
/// in the wild (`{data: {results}}`, `{results}`, bare list).
pub struct ScrapeApiClient {
    client: reqwest::Client,
    base_url: String,
}

/// Request body for a scrape batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScrapeBatchRequest {
    pub urls: Vec<String>,
    pub query: String,
    pub chunk_size: u32,
    pub concurrency: u32,
}

impl ScrapeApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Submit a scrape batch and return the raw response envelope.
    pub async fn scrape_and_extract(
        &self,
        request: &ScrapeBatchRequest,
    ) -> Result<serde_json::Value> {
        let endpoint = format!("{}/scrape_and_extract", self.base_url);

        debug!(
            urls = request.urls.len(),
            query = %request.query,
            "Submitting scrape batch"
        );

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ScrapeClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}
