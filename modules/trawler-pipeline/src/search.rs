use async_trait::async_trait;
use tracing::{info, warn};

use trawler_common::types::SearchHit;

use crate::traits::SearchProvider;

/// Per-query search results in execution order. A plain map would lose the
/// angle ordering the extractor and generator prompts depend on.
pub type SearchMap = Vec<(String, Vec<SearchHit>)>;

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

pub struct GoogleSearcher {
    api_key: String,
    cse_id: String,
    client: reqwest::Client,
}

impl GoogleSearcher {
    pub fn new(api_key: &str, cse_id: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            cse_id: cse_id.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SearchProvider for GoogleSearcher {
    async fn search(&self, query: &str, num_results: usize) -> Vec<SearchHit> {
        info!(query, num_results, "Google custom search");

        let num = num_results.min(10).to_string();
        let params = [
            ("key", self.api_key.as_str()),
            ("cx", self.cse_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
        ];

        let resp = match self.client.get(SEARCH_ENDPOINT).query(&params).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(query, error = %e, "Search request failed");
                return Vec::new();
            }
        };

        if !resp.status().is_success() {
            warn!(query, status = %resp.status(), "Search returned error status");
            return Vec::new();
        }

        let data: serde_json::Value = match resp.json().await {
            Ok(data) => data,
            Err(e) => {
                warn!(query, error = %e, "Failed to parse search response");
                return Vec::new();
            }
        };

        let results = data["items"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| {
                        let url = item["link"].as_str()?.to_string();
                        let title = item["title"].as_str().unwrap_or("").to_string();
                        let snippet = item["snippet"].as_str().unwrap_or("").to_string();
                        Some(SearchHit {
                            title,
                            url,
                            snippet,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        info!(query, count = results.len(), "Search complete");
        results
    }
}
