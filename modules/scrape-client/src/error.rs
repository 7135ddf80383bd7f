use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeClientError>;

#[derive(Debug, Error)]
pub enum ScrapeClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for ScrapeClientError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeClientError::Network(err.to_string())
    }
}
