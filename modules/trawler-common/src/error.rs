use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrawlerError {
    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Progress bus error: {0}")]
    Bus(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
