//! Conversation history for multi-turn research sessions.
//!
//! Invariant: assistant turns written back are short English summaries,
//! never artifact bodies. When history is rebuilt from persisted turns,
//! any verbatim artifact found in an assistant turn is swapped for the
//! placeholder and kept aside as the prior artifact for update mode.

use serde::{Deserialize, Serialize};

/// What an assistant turn says in place of the report it produced.
pub const ARTIFACT_PLACEHOLDER: &str = "Generated report with requested features.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    prior_artifact: Option<String>,
}

fn looks_like_artifact(content: &str) -> bool {
    let trimmed = content.trim_start();
    let lower = trimmed.to_lowercase();
    trimmed.starts_with('#') || lower.starts_with("<!doctype") || lower.starts_with("<html")
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted turns. Assistant turns carrying a verbatim
    /// artifact are compressed to the placeholder; the most recent artifact
    /// body is retained for update mode.
    pub fn rebuild(persisted: &[Turn]) -> Self {
        let mut turns = Vec::with_capacity(persisted.len());
        let mut prior_artifact = None;

        for turn in persisted {
            match turn.role {
                TurnRole::User => turns.push(turn.clone()),
                TurnRole::Assistant => {
                    if looks_like_artifact(&turn.content) {
                        prior_artifact = Some(turn.content.clone());
                        turns.push(Turn::assistant(ARTIFACT_PLACEHOLDER));
                    } else {
                        turns.push(turn.clone());
                    }
                }
            }
        }

        Self {
            turns,
            prior_artifact,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    /// Record the assistant side of a completed run. `summary` must be a
    /// short description, never the artifact body itself.
    pub fn push_assistant_summary(&mut self, summary: impl Into<String>) {
        self.turns.push(Turn::assistant(summary));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Prior user queries, oldest first.
    pub fn user_queries(&self) -> Vec<String> {
        self.turns
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .map(|t| t.content.clone())
            .collect()
    }

    /// The most recent artifact from an earlier turn, if any. Present iff
    /// this session should run the generator in update mode.
    pub fn prior_artifact(&self) -> Option<&str> {
        self.prior_artifact.as_deref()
    }

    pub fn set_prior_artifact(&mut self, body: impl Into<String>) {
        self.prior_artifact = Some(body.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_compresses_markdown_artifact() {
        let persisted = vec![
            Turn::user("Compare GDP of US vs China"),
            Turn::assistant("# GDP Comparison\n\n## Executive Summary\n…"),
        ];

        let history = ConversationHistory::rebuild(&persisted);

        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[1].content, ARTIFACT_PLACEHOLDER);
        assert!(history.prior_artifact().unwrap().starts_with("# GDP"));
    }

    #[test]
    fn rebuild_compresses_html_artifact() {
        let persisted = vec![
            Turn::user("make a dashboard"),
            Turn::assistant("<!DOCTYPE html>\n<html><body></body></html>"),
        ];

        let history = ConversationHistory::rebuild(&persisted);
        assert_eq!(history.turns()[1].content, ARTIFACT_PLACEHOLDER);
        assert!(history.prior_artifact().is_some());
    }

    #[test]
    fn rebuild_keeps_plain_assistant_turns() {
        let persisted = vec![
            Turn::user("hello"),
            Turn::assistant("Generated report covering three sources."),
        ];

        let history = ConversationHistory::rebuild(&persisted);
        assert_eq!(
            history.turns()[1].content,
            "Generated report covering three sources."
        );
        assert!(history.prior_artifact().is_none());
    }

    #[test]
    fn last_artifact_wins() {
        let persisted = vec![
            Turn::user("first"),
            Turn::assistant("# Old Report"),
            Turn::user("update it"),
            Turn::assistant("# New Report"),
        ];

        let history = ConversationHistory::rebuild(&persisted);
        assert_eq!(history.prior_artifact(), Some("# New Report"));
    }

    #[test]
    fn user_queries_in_order() {
        let mut history = ConversationHistory::new();
        history.push_user("a");
        history.push_assistant_summary("done");
        history.push_user("b");

        assert_eq!(history.user_queries(), vec!["a", "b"]);
    }
}
