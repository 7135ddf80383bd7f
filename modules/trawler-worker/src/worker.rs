//! Queue consumers — the `llm` consumer drives the research pipeline for
//! one job per task; the `scraper` consumer calls the scrape worker pool
//! and replies on the broker's result channel.
//!
//! Retry policy lives at this layer only: orchestration retries once with a
//! ten-second backoff, scraping at most twice with five seconds. Everything
//! below degrades to empty inputs instead of retrying.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use llm_client::{Claude, LanguageModel};
use scrape_client::{ScrapeApiClient, ScrapeBatchRequest};
use trawler_common::events::ProgressEvent;
use trawler_common::types::ScrapeResult;
use trawler_common::{Config, TrawlerError};
use trawler_pipeline::analyze::AnalysisSummarizer;
use trawler_pipeline::extract::DataExtractor;
use trawler_pipeline::generate::ArtifactGenerator;
use trawler_pipeline::planner::QueryPlanner;
use trawler_pipeline::scrape::QueuedScrapeService;
use trawler_pipeline::search::GoogleSearcher;
use trawler_pipeline::traits::ProgressSink;
use trawler_pipeline::{PipelineConfig, PipelineExecutor, RunRequest};
use trawler_queue::{
    DeepSearchTask, ProgressBus, ScrapeContentTask, TaskBroker, TaskEnvelope, DEEP_SEARCH_TASK,
    LLM_QUEUE, SCRAPER_QUEUE, SCRAPE_CONTENT_TASK,
};

use crate::jobs::JobStore;

pub const ORCHESTRATION_MAX_RETRIES: u32 = 1;
pub const ORCHESTRATION_RETRY_BACKOFF: Duration = Duration::from_secs(10);
pub const SCRAPE_MAX_RETRIES: u32 = 2;
pub const SCRAPE_RETRY_BACKOFF: Duration = Duration::from_secs(5);

const DEQUEUE_POLL: Duration = Duration::from_secs(5);

pub fn should_retry(attempt: u32, max_retries: u32) -> bool {
    attempt < max_retries
}

// ---------------------------------------------------------------------------
// LLM worker — queue `llm`, task `deep_search`
// ---------------------------------------------------------------------------

pub struct LlmWorker {
    config: Config,
    broker: TaskBroker,
    bus: ProgressBus,
    jobs: JobStore,
}

impl LlmWorker {
    pub fn new(config: Config, broker: TaskBroker, bus: ProgressBus, jobs: JobStore) -> Self {
        Self {
            config,
            broker,
            bus,
            jobs,
        }
    }

    pub async fn run(&self) {
        loop {
            match self.broker.dequeue(LLM_QUEUE, DEQUEUE_POLL).await {
                Ok(Some(envelope)) => self.handle(envelope).await,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "Dequeue from llm queue failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle(&self, envelope: TaskEnvelope) {
        if envelope.kind != DEEP_SEARCH_TASK {
            warn!(kind = %envelope.kind, "Unknown task kind on llm queue, dropping");
            return;
        }
        let task: DeepSearchTask = match serde_json::from_value(envelope.payload.clone()) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "Undecodable deep_search payload, dropping");
                return;
            }
        };

        let job_id = task.job_id.clone();
        info!(job_id, attempt = envelope.attempt, "Starting deep search");

        if let Err(e) = self.jobs.mark_processing(&job_id, &envelope.task_id).await {
            warn!(job_id, error = %e, "Failed to mark job processing, continuing");
        }

        let soft_limit = Duration::from_secs(self.config.task_soft_time_limit_secs);
        let executor = self.build_executor();
        let request = RunRequest {
            job_id: job_id.clone(),
            conversation_id: task.conversation_id.clone(),
            user_query: task.user_query.clone(),
            history: task.history.clone(),
            files: task.files.clone(),
            lab_mode: task.lab_mode,
        };

        let outcome = match tokio::time::timeout(soft_limit, executor.run(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TrawlerError::Generation(format!(
                "orchestration exceeded {} second soft time limit",
                soft_limit.as_secs()
            ))),
        };

        match outcome {
            Ok(payload) => {
                let result_json =
                    serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
                // Persistence lag is invisible to subscribers: the complete
                // event already went out on the bus.
                if let Err(e) = self.jobs.mark_completed(&job_id, &result_json).await {
                    warn!(job_id, error = %e, "Failed to persist completed job");
                }
                info!(job_id, "Deep search complete");
            }
            Err(TrawlerError::Cancelled) => {
                info!(job_id, "Deep search cancelled, leaving job in processing");
            }
            Err(e) => {
                if should_retry(envelope.attempt, ORCHESTRATION_MAX_RETRIES) {
                    warn!(job_id, error = %e, attempt = envelope.attempt, "Deep search failed, retrying");
                    tokio::time::sleep(ORCHESTRATION_RETRY_BACKOFF).await;
                    let mut retry = envelope.clone();
                    retry.attempt += 1;
                    if let Err(e) = self.broker.enqueue_envelope(LLM_QUEUE, &retry).await {
                        warn!(job_id, error = %e, "Failed to re-enqueue deep search task");
                    }
                    return;
                }

                warn!(job_id, error = %e, "Deep search failed after retries");
                self.bus
                    .publish(
                        &job_id,
                        &ProgressEvent::error(format!("Search failed: {e}"), true),
                    )
                    .await;
                if let Err(persist_err) = self.jobs.mark_failed(&job_id, &e.to_string()).await {
                    warn!(job_id, error = %persist_err, "Failed to persist failed job");
                }
            }
        }
    }

    fn build_executor(&self) -> PipelineExecutor {
        let config = &self.config;
        let model: Arc<dyn LanguageModel> =
            Arc::new(Claude::new(&config.anthropic_api_key, &config.llm_model));

        let sink: Arc<dyn ProgressSink> = Arc::new(self.bus.clone());
        PipelineExecutor::new(
            QueryPlanner::new(model.clone()),
            Arc::new(GoogleSearcher::new(
                &config.google_api_key,
                &config.google_cse_id,
            )),
            Arc::new(QueuedScrapeService::new(
                self.broker.clone(),
                Duration::from_secs(config.scrape_timeout_secs),
            )),
            DataExtractor::new(model.clone()),
            ArtifactGenerator::new(model.clone(), config.artifact_mode),
            AnalysisSummarizer::new(model),
            sink,
            PipelineConfig::from_config(config),
            Arc::new(AtomicBool::new(false)),
        )
    }
}

// ---------------------------------------------------------------------------
// Scrape worker — queue `scraper`, task `scrape_content`
// ---------------------------------------------------------------------------

pub struct ScrapeWorker {
    config: Config,
    broker: TaskBroker,
    client: ScrapeApiClient,
}

impl ScrapeWorker {
    pub fn new(config: Config, broker: TaskBroker) -> Self {
        let client = ScrapeApiClient::new(
            &config.scraper_api_url,
            Duration::from_secs(config.scrape_timeout_secs),
        );
        Self {
            config,
            broker,
            client,
        }
    }

    pub async fn run(&self) {
        loop {
            match self.broker.dequeue(SCRAPER_QUEUE, DEQUEUE_POLL).await {
                Ok(Some(envelope)) => self.handle(envelope).await,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "Dequeue from scraper queue failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle(&self, envelope: TaskEnvelope) {
        if envelope.kind != SCRAPE_CONTENT_TASK {
            warn!(kind = %envelope.kind, "Unknown task kind on scraper queue, dropping");
            return;
        }
        let task: ScrapeContentTask = match serde_json::from_value(envelope.payload.clone()) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "Undecodable scrape_content payload, dropping");
                return;
            }
        };

        info!(
            job_id = %task.job_id,
            urls = task.urls.len(),
            attempt = envelope.attempt,
            "Scraping url batch"
        );

        let request = ScrapeBatchRequest {
            urls: task.urls.clone(),
            query: task.primary_query.clone(),
            chunk_size: self.config.scrape_chunk_size,
            concurrency: self.config.scrape_concurrency,
        };

        let payload = match self.client.scrape_and_extract(&request).await {
            Ok(payload) => payload,
            Err(e) => {
                if should_retry(envelope.attempt, SCRAPE_MAX_RETRIES) {
                    warn!(
                        job_id = %task.job_id,
                        error = %e,
                        attempt = envelope.attempt,
                        "Scrape failed, retrying"
                    );
                    tokio::time::sleep(SCRAPE_RETRY_BACKOFF).await;
                    let mut retry = envelope.clone();
                    retry.attempt += 1;
                    if let Err(e) = self.broker.enqueue_envelope(SCRAPER_QUEUE, &retry).await {
                        warn!(job_id = %task.job_id, error = %e, "Failed to re-enqueue scrape task");
                    }
                    return;
                }

                warn!(job_id = %task.job_id, error = %e, "Scrape failed after retries, reporting per-url errors");
                failure_envelope(&task.urls, &e.to_string())
            }
        };

        if let Err(e) = self.broker.push_result(&envelope.task_id, &payload).await {
            warn!(job_id = %task.job_id, error = %e, "Failed to push scrape result");
        }
    }
}

/// Final-failure envelope: one error record per requested url, in the
/// `{ok, error, results}` shape consumers already normalize.
fn failure_envelope(urls: &[String], error: &str) -> serde_json::Value {
    let results: Vec<ScrapeResult> = urls
        .iter()
        .map(|url| ScrapeResult::failed(url, error))
        .collect();
    serde_json::json!({
        "ok": false,
        "error": error,
        "results": results,
    })
}
