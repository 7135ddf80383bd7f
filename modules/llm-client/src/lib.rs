pub mod claude;
pub mod util;

pub use claude::Claude;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Completion Request
// =============================================================================

/// A single text-completion request. Every pipeline component builds one of
/// these, sends it through a [`LanguageModel`], and parses the returned text
/// itself. Stages with their own time bound set `deadline`; providers apply
/// it to the underlying call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub deadline: Option<Duration>,
}

impl CompletionRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            max_tokens: 4096,
            temperature: 0.3,
            deadline: None,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

// =============================================================================
// LanguageModel Trait
// =============================================================================

/// Provider seam. Production uses [`Claude`]; tests inject scripted stubs.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
