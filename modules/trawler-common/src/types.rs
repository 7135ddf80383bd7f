use serde::{Deserialize, Serialize};

/// Row-major table extracted by the scrape worker. Preserved verbatim;
/// the orchestrator never looks inside.
pub type Table = serde_json::Value;

// ---------------------------------------------------------------------------
// Research plan
// ---------------------------------------------------------------------------

/// Structured output of the query planner: whether to search the web, which
/// angles to search, and what kinds of data to extract afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub web_search_needed: bool,
    pub search_queries: Vec<String>,
    pub data_extraction_needed: bool,
    pub data_types: Vec<String>,
}

impl ResearchPlan {
    /// Plan for queries that need no web research at all.
    pub fn no_search() -> Self {
        Self {
            web_search_needed: false,
            search_queries: Vec::new(),
            data_extraction_needed: false,
            data_types: Vec::new(),
        }
    }

    /// Last-resort plan: search the user's own words verbatim.
    pub fn fallback(user_query: &str) -> Self {
        Self {
            web_search_needed: true,
            search_queries: vec![user_query.to_string()],
            data_extraction_needed: false,
            data_types: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

// ---------------------------------------------------------------------------
// Scrape results
// ---------------------------------------------------------------------------

/// Per-url evidence returned by the scrape worker pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub url: String,
    #[serde(default)]
    pub best_chunk: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub chunk_index: i64,
    #[serde(default)]
    pub total_chunks: i64,
    #[serde(default)]
    pub word_count: i64,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub tables_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScrapeResult {
    /// Successful iff the worker reported no error and found relevant text.
    pub fn is_successful(&self) -> bool {
        self.error.is_none() && !self.best_chunk.is_empty()
    }

    /// Error record for a url the worker could not process.
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            chunk_index: -1,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Markdown,
    Html,
}

/// Final generated document. Html bodies begin with a doctype or html open
/// tag; markdown bodies begin with a heading line. The generator enforces
/// both before constructing one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_result_success_requires_chunk() {
        let mut r = ScrapeResult {
            url: "https://example.com".into(),
            best_chunk: "some text".into(),
            score: 0.9,
            ..Default::default()
        };
        assert!(r.is_successful());

        r.best_chunk.clear();
        assert!(!r.is_successful());
    }

    #[test]
    fn scrape_result_success_requires_no_error() {
        let r = ScrapeResult {
            url: "https://example.com".into(),
            best_chunk: "some text".into(),
            error: Some("HTTP 503".into()),
            ..Default::default()
        };
        assert!(!r.is_successful());
    }

    #[test]
    fn failed_record_has_sentinel_chunk_index() {
        let r = ScrapeResult::failed("https://example.com", "Timeout");
        assert_eq!(r.chunk_index, -1);
        assert_eq!(r.error.as_deref(), Some("Timeout"));
        assert!(!r.is_successful());
    }

    #[test]
    fn scrape_result_decodes_sparse_json() {
        let r: ScrapeResult =
            serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(r.url, "https://example.com");
        assert!(r.tables.is_empty());
        assert!(r.error.is_none());
    }

    #[test]
    fn job_status_round_trips() {
        let s: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(s, JobStatus::Processing);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"processing\"");
    }
}
