pub(crate) mod types;

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::{CompletionRequest, LanguageModel};
use types::{ChatRequest, ChatResponse, WireMessage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Ceiling for a completion whose request carries no deadline of its own.
/// Planning and extraction set tighter per-request deadlines; generation
/// and analysis run under this one.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(90);

// =============================================================================
// Claude
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_messages(&self, wire: &ChatRequest, deadline: Duration) -> Result<ChatResponse> {
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = %wire.model,
            deadline_secs = deadline.as_secs(),
            "Sending completion request"
        );

        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(deadline)
            .json(wire)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic returned {status}: {body}"));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LanguageModel for Claude {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let deadline = request.deadline.unwrap_or(DEFAULT_DEADLINE);

        let mut wire = ChatRequest::new(&self.model)
            .message(WireMessage::user(&request.user))
            .max_tokens(request.max_tokens)
            .temperature(request.temperature);
        if let Some(ref system) = request.system {
            wire = wire.system(system);
        }

        let response = self.post_messages(&wire, deadline).await?;

        response
            .text()
            .ok_or_else(|| anyhow!("No text content in completion response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claude_new() {
        let ai = Claude::new("sk-ant-test", "claude-sonnet-4-20250514");
        assert_eq!(ai.model(), "claude-sonnet-4-20250514");
        assert_eq!(ai.base_url, ANTHROPIC_API_URL);
    }

    #[test]
    fn test_claude_with_base_url() {
        let ai = Claude::new("sk-ant-test", "claude-sonnet-4-20250514")
            .with_base_url("https://custom.api.com/");
        assert_eq!(ai.base_url, "https://custom.api.com");
    }
}
