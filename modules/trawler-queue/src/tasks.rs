//! Task payloads carried on the broker. Arguments are plain JSON values —
//! no references, no handles — so any worker can pick them up.

use serde::{Deserialize, Serialize};

use trawler_common::history::Turn;

pub const DEEP_SEARCH_TASK: &str = "deep_search";
pub const SCRAPE_CONTENT_TASK: &str = "scrape_content";

/// Queue `llm`: run the full research pipeline for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSearchTask {
    pub job_id: String,
    pub conversation_id: String,
    pub user_query: String,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub lab_mode: bool,
}

/// Queue `scraper`: scrape a url batch and reply on the result channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeContentTask {
    pub job_id: String,
    pub urls: Vec<String>,
    pub primary_query: String,
    pub original_query: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawler_common::history::Turn;

    #[test]
    fn deep_search_task_round_trips() {
        let task = DeepSearchTask {
            job_id: "j-1".into(),
            conversation_id: "c-1".into(),
            user_query: "compare gdp".into(),
            history: vec![Turn::user("earlier question")],
            files: vec![],
            lab_mode: true,
        };

        let json = serde_json::to_string(&task).unwrap();
        let back: DeepSearchTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, "j-1");
        assert_eq!(back.history.len(), 1);
        assert!(back.lab_mode);
    }

    #[test]
    fn deep_search_task_optionals_default() {
        let task: DeepSearchTask = serde_json::from_str(
            r#"{"job_id": "j", "conversation_id": "c", "user_query": "q"}"#,
        )
        .unwrap();
        assert!(task.history.is_empty());
        assert!(task.files.is_empty());
        assert!(!task.lab_mode);
    }

    #[test]
    fn scrape_task_round_trips() {
        let task = ScrapeContentTask {
            job_id: "j-1".into(),
            urls: vec!["https://a.example".into(), "https://b.example".into()],
            primary_query: "gdp 2026".into(),
            original_query: "compare gdp".into(),
        };

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["urls"].as_array().unwrap().len(), 2);
        let back: ScrapeContentTask = serde_json::from_value(json).unwrap();
        assert_eq!(back.primary_query, "gdp 2026");
    }
}
