//! Shared test doubles for pipeline components.
//!
//! Everything here is deterministic and in-memory: no network, no Redis.
//! Mirrors the injection seams in `traits` so a whole pipeline run can be
//! exercised from a unit test.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use llm_client::{CompletionRequest, LanguageModel};
use trawler_common::events::ProgressEvent;
use trawler_common::types::{ScrapeResult, SearchHit};

use crate::traits::{ProgressSink, ScrapeService, SearchProvider};

// ---------------------------------------------------------------------------
// StubModel — scripted LLM responses
// ---------------------------------------------------------------------------

pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    failing: bool,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            failing: false,
        }
    }

    /// A model whose every call errors.
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        if self.failing {
            return Err(anyhow!("stub model configured to fail"));
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("stub model ran out of scripted responses"))
    }
}

// ---------------------------------------------------------------------------
// StubSearch — canned results per query
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StubSearch {
    results: HashMap<String, Vec<SearchHit>>,
    calls: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.results.insert(query.to_string(), hits);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, query: &str, _num_results: usize) -> Vec<SearchHit> {
        self.calls.lock().unwrap().push(query.to_string());
        self.results.get(query).cloned().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// StubScrape — fixed scrape output, recorded calls
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StubScrape {
    results: Vec<ScrapeResult>,
    calls: Mutex<Vec<(Vec<String>, String)>>,
}

impl StubScrape {
    pub fn returning(results: Vec<ScrapeResult>) -> Self {
        Self {
            results,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (urls, primary_query) per invocation.
    pub fn calls(&self) -> Vec<(Vec<String>, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScrapeService for StubScrape {
    async fn scrape(
        &self,
        _job_id: &str,
        urls: &[String],
        primary_query: &str,
        _original_query: &str,
    ) -> Vec<ScrapeResult> {
        self.calls
            .lock()
            .unwrap()
            .push((urls.to_vec(), primary_query.to_string()));
        self.results.clone()
    }
}

/// Scrape service that raises the cancel flag mid-stage, simulating a
/// cancellation arriving while scrape work is in flight.
pub struct CancellingScrape {
    pub flag: Arc<AtomicBool>,
}

#[async_trait]
impl ScrapeService for CancellingScrape {
    async fn scrape(
        &self,
        _job_id: &str,
        _urls: &[String],
        _primary_query: &str,
        _original_query: &str,
    ) -> Vec<ScrapeResult> {
        self.flag.store(true, Ordering::Relaxed);
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// RecordingSink — captures the published event stream
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn publish(&self, _job_id: &str, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn search_hit(url: &str, snippet: &str) -> SearchHit {
    SearchHit {
        title: format!("Page at {url}"),
        url: url.to_string(),
        snippet: snippet.to_string(),
    }
}

pub fn scrape_result(url: &str, chunk: &str, score: f64) -> ScrapeResult {
    ScrapeResult {
        url: url.to_string(),
        best_chunk: chunk.to_string(),
        score,
        chunk_index: 0,
        total_chunks: 1,
        word_count: chunk.split_whitespace().count() as i64,
        tables: Vec::new(),
        tables_count: 0,
        error: None,
    }
}
