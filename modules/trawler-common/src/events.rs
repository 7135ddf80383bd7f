//! Progress events broadcast on the pub/sub channel `job:{id}`.
//!
//! The wire format is `{"type": …, "content": …}` plus extra fields per
//! kind. The enum is closed over the known kinds; unknown tags decode to
//! [`ProgressEvent::Unknown`] so consumers survive newer publishers.

use serde::{Deserialize, Serialize};

/// Payload of a `sources` event: one search angle and the urls it surfaced
/// that had not been seen earlier in the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesPayload {
    pub transformed_query: String,
    pub urls: Vec<String>,
}

/// Terminal payload carried by the `complete` event and persisted as the
/// job result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalPayload {
    pub conversation_id: String,
    /// Analytical narrative text.
    pub content: String,
    /// One url list per executed search angle, in execution order.
    pub sources: Vec<Vec<String>>,
    pub reasoning_steps: Vec<String>,
    /// The extracted data bag.
    pub assets: serde_json::Value,
    /// The artifact body (markdown report or html app).
    pub app: String,
    pub lab_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Reasoning {
        content: String,
    },
    Sources {
        content: SourcesPayload,
    },
    Html {
        content: String,
    },
    Markdown {
        content: String,
    },
    AnalysisSummary {
        content: String,
    },
    Complete {
        content: FinalPayload,
    },
    Error {
        content: String,
        #[serde(default, skip_serializing_if = "is_false")]
        fatal: bool,
    },
    Done {
        content: String,
    },
    #[serde(other)]
    Unknown,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ProgressEvent {
    pub fn reasoning(content: impl Into<String>) -> Self {
        ProgressEvent::Reasoning {
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>, fatal: bool) -> Self {
        ProgressEvent::Error {
            content: content.into(),
            fatal,
        }
    }

    /// True when no further events will follow on the channel.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { fatal: true, .. }
        )
    }

    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Reasoning { .. } => "reasoning",
            ProgressEvent::Sources { .. } => "sources",
            ProgressEvent::Html { .. } => "html",
            ProgressEvent::Markdown { .. } => "markdown",
            ProgressEvent::AnalysisSummary { .. } => "analysis_summary",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::Done { .. } => "done",
            ProgressEvent::Unknown => "unknown",
        }
    }
}

/// Channel name for a job's progress stream.
pub fn job_channel(job_id: &str) -> String {
    format!("job:{job_id}")
}
