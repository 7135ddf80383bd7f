//! Standalone runner — the research pipeline without the queue tier.
//!
//! Binds the executor to the scrape pool's HTTP API directly and streams
//! progress to the log instead of Redis. Useful for local runs and for
//! exercising the pipeline against real providers:
//!
//!     worker-standalone "Compare GDP of US vs China"

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::info;
use tracing_subscriber::EnvFilter;

use llm_client::{Claude, LanguageModel};
use scrape_client::ScrapeApiClient;
use trawler_common::events::ProgressEvent;
use trawler_common::Config;
use trawler_pipeline::analyze::AnalysisSummarizer;
use trawler_pipeline::extract::DataExtractor;
use trawler_pipeline::generate::ArtifactGenerator;
use trawler_pipeline::planner::QueryPlanner;
use trawler_pipeline::scrape::DirectScrapeService;
use trawler_pipeline::search::GoogleSearcher;
use trawler_pipeline::traits::ProgressSink;
use trawler_pipeline::{PipelineConfig, PipelineExecutor, RunRequest};

/// Progress sink that narrates the run to the log.
struct LogSink;

#[async_trait]
impl ProgressSink for LogSink {
    async fn publish(&self, job_id: &str, event: &ProgressEvent) {
        match event {
            ProgressEvent::Reasoning { content } => info!(job_id, "{content}"),
            ProgressEvent::Sources { content } => {
                info!(job_id, query = %content.transformed_query, urls = content.urls.len(), "sources")
            }
            ProgressEvent::Complete { .. } => info!(job_id, "complete"),
            other => info!(job_id, kind = other.kind(), "event"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trawler=info".parse()?))
        .init();

    let user_query = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    if user_query.is_empty() {
        return Err(anyhow!("usage: standalone <research query>"));
    }

    let config = Config::worker_from_env();
    config.log_redacted();

    let model: Arc<dyn LanguageModel> =
        Arc::new(Claude::new(&config.anthropic_api_key, &config.llm_model));
    let scrape_client = ScrapeApiClient::new(
        &config.scraper_api_url,
        Duration::from_secs(config.scrape_timeout_secs),
    );

    let executor = PipelineExecutor::new(
        QueryPlanner::new(model.clone()),
        Arc::new(GoogleSearcher::new(
            &config.google_api_key,
            &config.google_cse_id,
        )),
        Arc::new(DirectScrapeService::new(
            scrape_client,
            config.scrape_chunk_size,
            config.scrape_concurrency,
        )),
        DataExtractor::new(model.clone()),
        ArtifactGenerator::new(model.clone(), config.artifact_mode),
        AnalysisSummarizer::new(model),
        Arc::new(LogSink),
        PipelineConfig::from_config(&config),
        Arc::new(AtomicBool::new(false)),
    );

    let payload = executor
        .run(RunRequest {
            job_id: "standalone".to_string(),
            conversation_id: "standalone".to_string(),
            user_query,
            history: Vec::new(),
            files: Vec::new(),
            lab_mode: false,
        })
        .await
        .map_err(|e| anyhow!("pipeline failed: {e}"))?;

    println!("{}", payload.app);
    eprintln!("\n--- analysis ---\n{}", payload.content);
    Ok(())
}
