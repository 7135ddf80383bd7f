pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod types;

pub use config::Config;
pub use error::TrawlerError;
pub use events::{FinalPayload, ProgressEvent, SourcesPayload};
pub use history::{ConversationHistory, Turn, TurnRole};
pub use types::{
    Artifact, ArtifactKind, JobStatus, ResearchPlan, ScrapeResult, SearchHit, Table,
};
