mod jobs;
mod worker;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trawler_common::Config;
use trawler_queue::{ProgressBus, TaskBroker};

use jobs::JobStore;
use worker::{LlmWorker, ScrapeWorker};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trawler=info".parse()?))
        .init();

    info!("Trawler worker starting...");

    // Load config
    let config = Config::worker_from_env();
    config.log_redacted();

    // Connect shared infrastructure
    let broker = TaskBroker::connect(&config.broker_url).await?;
    let bus = ProgressBus::connect(&config.broker_url).await?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let jobs = JobStore::new(pool);

    let mut handles = Vec::new();

    for i in 0..config.worker_concurrency_llm {
        let worker = LlmWorker::new(config.clone(), broker.clone(), bus.clone(), jobs.clone());
        handles.push(tokio::spawn(async move {
            info!(consumer = i, queue = "llm", "Consumer started");
            worker.run().await;
        }));
    }

    for i in 0..config.worker_concurrency_scraper {
        let worker = ScrapeWorker::new(config.clone(), broker.clone());
        handles.push(tokio::spawn(async move {
            info!(consumer = i, queue = "scraper", "Consumer started");
            worker.run().await;
        }));
    }

    // Janitor: reap jobs stuck in processing past twice the hard task limit
    // (covers cancelled runs and workers that died mid-task).
    {
        let jobs = jobs.clone();
        let stale_after = chrono::Duration::seconds(2 * config.task_time_limit_secs as i64);
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                tick.tick().await;
                match jobs.fail_stale_processing(stale_after).await {
                    Ok(0) => {}
                    Ok(n) => info!(reaped = n, "Janitor failed stale processing jobs"),
                    Err(e) => tracing::warn!(error = %e, "Janitor sweep failed"),
                }
            }
        }));
    }

    info!(
        llm = config.worker_concurrency_llm,
        scraper = config.worker_concurrency_scraper,
        "All consumers running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping consumers");
    for handle in &handles {
        handle.abort();
    }

    Ok(())
}
