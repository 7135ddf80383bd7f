//! Pipeline executor — sequences planning, search, scrape, extraction,
//! generation, and analysis for one job, publishing progress as it goes.
//!
//! The executor is the only publisher on a job's progress channel, so
//! per-job event order equals publication order. All collaborators arrive
//! through injected traits; the executor has no idea whether scraping is
//! local or remote, which is what lets it run in unit tests unchanged.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use trawler_common::config::Config;
use trawler_common::error::TrawlerError;
use trawler_common::events::{FinalPayload, ProgressEvent, SourcesPayload};
use trawler_common::history::{ConversationHistory, Turn};
use trawler_common::types::{ArtifactKind, ScrapeResult};

use crate::analyze::AnalysisSummarizer;
use crate::extract::DataExtractor;
use crate::generate::ArtifactGenerator;
use crate::planner::QueryPlanner;
use crate::search::SearchMap;
use crate::traits::{ProgressSink, ScrapeService, SearchProvider};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_search_queries: usize,
    pub max_urls_to_scrape: usize,
    pub enable_scraping: bool,
    pub search_results_per_query: usize,
    /// Cooperative delay between successive search queries.
    pub search_throttle: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_search_queries: 5,
            max_urls_to_scrape: 5,
            enable_scraping: true,
            search_results_per_query: 10,
            search_throttle: Duration::from_millis(300),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_search_queries: config.max_search_queries,
            max_urls_to_scrape: config.max_urls_to_scrape,
            enable_scraping: config.enable_scraping,
            ..Default::default()
        }
    }
}

/// Everything one `run` needs to know about its job.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub job_id: String,
    pub conversation_id: String,
    pub user_query: String,
    pub history: Vec<Turn>,
    pub files: Vec<String>,
    pub lab_mode: bool,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct PipelineExecutor {
    planner: QueryPlanner,
    searcher: Arc<dyn SearchProvider>,
    scraper: Arc<dyn ScrapeService>,
    extractor: DataExtractor,
    generator: ArtifactGenerator,
    analyst: AnalysisSummarizer,
    sink: Arc<dyn ProgressSink>,
    config: PipelineConfig,
    cancelled: Arc<AtomicBool>,
}

impl PipelineExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        planner: QueryPlanner,
        searcher: Arc<dyn SearchProvider>,
        scraper: Arc<dyn ScrapeService>,
        extractor: DataExtractor,
        generator: ArtifactGenerator,
        analyst: AnalysisSummarizer,
        sink: Arc<dyn ProgressSink>,
        config: PipelineConfig,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            planner,
            searcher,
            scraper,
            extractor,
            generator,
            analyst,
            sink,
            config,
            cancelled,
        }
    }

    /// Shared flag a supervisor raises to cancel the run at its next
    /// suspension point.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    fn check_cancelled(&self) -> Result<(), TrawlerError> {
        if self.cancelled.load(Ordering::Relaxed) {
            info!("Pipeline run cancelled");
            return Err(TrawlerError::Cancelled);
        }
        Ok(())
    }

    /// Run the full pipeline for one job and return the terminal payload.
    ///
    /// Only generation failures and cancellation surface as errors; every
    /// other stage degrades to empty inputs for its successors.
    pub async fn run(&self, request: RunRequest) -> Result<FinalPayload, TrawlerError> {
        let job_id = request.job_id.clone();
        let mut history = ConversationHistory::rebuild(&request.history);
        let prior_queries = history.user_queries();
        let mut steps: Vec<String> = Vec::new();

        self.check_cancelled()?;

        // S1: planning
        self.reasoning(&job_id, &mut steps, "Analyzing your search query...")
            .await;
        let mut plan = self
            .planner
            .plan(&request.user_query, &prior_queries)
            .await;
        plan.search_queries.truncate(self.config.max_search_queries);

        let research_needed = plan.web_search_needed && !plan.search_queries.is_empty();
        if research_needed {
            self.reasoning(
                &job_id,
                &mut steps,
                format!(
                    "Planning research with {} search angles",
                    plan.search_queries.len()
                ),
            )
            .await;
        } else {
            self.reasoning(&job_id, &mut steps, "No web research needed for this query")
                .await;
        }

        let mut search_map: SearchMap = Vec::new();
        let mut sources_by_query: Vec<Vec<String>> = Vec::new();
        let mut scrape_results: Vec<ScrapeResult> = Vec::new();
        let mut data_bag = serde_json::json!({});

        if research_needed {
            // S2: searching
            self.check_cancelled()?;
            self.reasoning(
                &job_id,
                &mut steps,
                format!(
                    "Executing {} targeted web searches...",
                    plan.search_queries.len()
                ),
            )
            .await;

            let mut seen_urls: HashSet<String> = HashSet::new();
            let mut all_urls: Vec<String> = Vec::new();

            let total = plan.search_queries.len();
            for (i, query) in plan.search_queries.iter().enumerate() {
                self.check_cancelled()?;

                let hits = self
                    .searcher
                    .search(query, self.config.search_results_per_query)
                    .await;

                let mut new_urls = Vec::new();
                for hit in &hits {
                    if seen_urls.insert(hit.url.clone()) {
                        all_urls.push(hit.url.clone());
                        new_urls.push(hit.url.clone());
                    }
                }

                info!(job_id, query = %query, hits = hits.len(), new = new_urls.len(), "Search angle complete");
                search_map.push((query.clone(), hits));
                sources_by_query.push(new_urls.clone());

                self.sink
                    .publish(
                        &job_id,
                        &ProgressEvent::Sources {
                            content: SourcesPayload {
                                transformed_query: query.clone(),
                                urls: new_urls,
                            },
                        },
                    )
                    .await;

                if i + 1 < total {
                    tokio::time::sleep(self.config.search_throttle).await;
                }
            }

            self.reasoning(
                &job_id,
                &mut steps,
                format!("Found {} unique sources...", all_urls.len()),
            )
            .await;

            // S3: scraping
            if self.config.enable_scraping && !all_urls.is_empty() {
                let urls_to_scrape: Vec<String> = all_urls
                    .iter()
                    .take(self.config.max_urls_to_scrape)
                    .cloned()
                    .collect();
                // First planned angle doubles as the relevance query.
                let primary_query = plan.search_queries[0].clone();

                self.reasoning(
                    &job_id,
                    &mut steps,
                    format!(
                        "Performing deep analysis of top {} sources...",
                        urls_to_scrape.len()
                    ),
                )
                .await;

                self.check_cancelled()?;
                scrape_results = self
                    .scraper
                    .scrape(&job_id, &urls_to_scrape, &primary_query, &request.user_query)
                    .await;
                self.check_cancelled()?;

                let successful: Vec<&ScrapeResult> =
                    scrape_results.iter().filter(|s| s.is_successful()).collect();
                info!(
                    job_id,
                    successful = successful.len(),
                    total = scrape_results.len(),
                    "Scrape stage complete"
                );
                for scrape in &successful {
                    info!(
                        url = %scrape.url,
                        score = scrape.score,
                        tables = scrape.tables_count,
                        words = scrape.word_count,
                        "Scraped source"
                    );
                }
            } else {
                self.reasoning(&job_id, &mut steps, "Skipping content scraping")
                    .await;
            }

            // S4: extraction
            self.check_cancelled()?;
            self.reasoning(&job_id, &mut steps, "Developing assets from gathered evidence...")
                .await;
            data_bag = self
                .extractor
                .extract(
                    &search_map,
                    &scrape_results,
                    &plan.data_types,
                    &request.user_query,
                )
                .await;
        } else {
            // The research stages are skipped but still announced, so the
            // stream shape stays uniform for subscribers.
            self.reasoning(&job_id, &mut steps, "Skipping web search").await;
            self.reasoning(&job_id, &mut steps, "Skipping content scraping")
                .await;
            self.reasoning(&job_id, &mut steps, "Skipping data extraction")
                .await;
        }

        // S5: generation
        self.check_cancelled()?;
        self.reasoning(&job_id, &mut steps, "Generating comprehensive report...")
            .await;
        let artifact = self
            .generator
            .generate(
                &request.user_query,
                &search_map,
                &scrape_results,
                &data_bag,
                request.lab_mode,
                &mut history,
            )
            .await
            .map_err(|e| {
                warn!(job_id, error = %e, "Generation failed");
                TrawlerError::Generation(e.to_string())
            })?;

        let artifact_event = match artifact.kind {
            ArtifactKind::Html => ProgressEvent::Html {
                content: artifact.body.clone(),
            },
            ArtifactKind::Markdown => ProgressEvent::Markdown {
                content: artifact.body.clone(),
            },
        };
        self.sink.publish(&job_id, &artifact_event).await;

        // S6: analysis
        self.check_cancelled()?;
        self.reasoning(&job_id, &mut steps, "Analyzing research thought process...")
            .await;
        let analysis = self
            .analyst
            .summarize(
                &request.user_query,
                &search_map,
                &scrape_results,
                &data_bag,
                &artifact.body,
            )
            .await;
        self.sink
            .publish(
                &job_id,
                &ProgressEvent::AnalysisSummary {
                    content: analysis.clone(),
                },
            )
            .await;

        let payload = FinalPayload {
            conversation_id: request.conversation_id.clone(),
            content: analysis,
            sources: sources_by_query,
            reasoning_steps: steps,
            assets: data_bag,
            app: artifact.body,
            lab_mode: request.lab_mode,
        };

        self.sink
            .publish(
                &job_id,
                &ProgressEvent::Complete {
                    content: payload.clone(),
                },
            )
            .await;
        self.sink
            .publish(
                &job_id,
                &ProgressEvent::Done {
                    content: String::new(),
                },
            )
            .await;

        info!(job_id, "Pipeline run complete");
        Ok(payload)
    }

    async fn reasoning(&self, job_id: &str, steps: &mut Vec<String>, msg: impl Into<String>) {
        let msg = msg.into();
        steps.push(msg.clone());
        self.sink
            .publish(job_id, &ProgressEvent::Reasoning { content: msg })
            .await;
    }
}
