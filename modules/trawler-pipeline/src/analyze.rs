//! Analysis summarizer — narrates the reasoning path from sources to report
//! structure. Purely additive: a failed summary never fails the job.

use std::sync::Arc;

use tracing::warn;

use llm_client::{
    util::truncate_to_char_boundary, CompletionRequest, LanguageModel,
};
use trawler_common::types::ScrapeResult;

use crate::search::SearchMap;

const TOP_SOURCES: usize = 5;
const CHUNK_SAMPLE_CAP: usize = 1_000;
const DATA_SAMPLE_CAP: usize = 500;
const DATA_SAMPLE_KEYS: usize = 5;
const HEADING_CAP: usize = 15;

pub const ANALYSIS_PLACEHOLDER: &str = "Unable to generate analytical summary.";

pub struct AnalysisSummarizer {
    model: Arc<dyn LanguageModel>,
}

impl AnalysisSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Explain how the report came to be. Returns a placeholder on failure.
    pub async fn summarize(
        &self,
        user_query: &str,
        _search_map: &SearchMap,
        scrape_results: &[ScrapeResult],
        data_bag: &serde_json::Value,
        artifact_body: &str,
    ) -> String {
        let prompt = build_analysis_prompt(user_query, scrape_results, data_bag, artifact_body);
        let request = CompletionRequest::new(prompt)
            .system(
                "You are an expert analyst explaining complex research processes. You \
                 articulate how raw data becomes insights through analytical thinking, \
                 pattern recognition, and synthesis."
                    .to_string(),
            )
            .max_tokens(1500)
            .temperature(0.7);

        match self.model.complete(request).await {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => {
                warn!("Analysis model returned empty summary");
                ANALYSIS_PLACEHOLDER.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Failed to generate analytical summary");
                ANALYSIS_PLACEHOLDER.to_string()
            }
        }
    }
}

/// Section headings of the artifact, report structure at a glance.
fn extract_headings(artifact_body: &str) -> Vec<String> {
    artifact_body
        .lines()
        .filter(|line| line.starts_with("##"))
        .map(|line| line.trim().to_string())
        .take(HEADING_CAP)
        .collect()
}

fn build_analysis_prompt(
    user_query: &str,
    scrape_results: &[ScrapeResult],
    data_bag: &serde_json::Value,
    artifact_body: &str,
) -> String {
    // Top sources by relevance score.
    let mut successful: Vec<&ScrapeResult> =
        scrape_results.iter().filter(|s| s.is_successful()).collect();
    successful.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut sources_block = String::new();
    for (i, scrape) in successful.iter().take(TOP_SOURCES).enumerate() {
        sources_block.push_str(&format!(
            "\nSource {}: {}\nRelevance Score: {:.2}\nKey Content Found:\n{}\nTables: {}\n---",
            i + 1,
            scrape.url,
            scrape.score,
            truncate_to_char_boundary(&scrape.best_chunk, CHUNK_SAMPLE_CAP),
            scrape.tables_count
        ));
    }

    let mut data_sample = serde_json::Map::new();
    if let Some(obj) = data_bag.as_object() {
        for (key, value) in obj.iter().take(DATA_SAMPLE_KEYS) {
            let rendered = value.to_string();
            data_sample.insert(
                key.clone(),
                serde_json::Value::String(
                    truncate_to_char_boundary(&rendered, DATA_SAMPLE_CAP).to_string(),
                ),
            );
        }
    }
    let data_block = serde_json::to_string_pretty(&data_sample).unwrap_or_default();

    let headings = extract_headings(artifact_body).join("\n");

    format!(
        r#"You are analyzing a research and report generation process. Explain the ANALYTICAL THOUGHT PROCESS - not statistics, but how information was interpreted, connected, and synthesized.

USER'S QUESTION:
"{user_query}"

SOURCES DISCOVERED:
{sources_block}

STRUCTURED DATA EXTRACTED:
{data_block}

FINAL REPORT STRUCTURE:
{headings}

YOUR TASK:
Write a 4 paragraph narrative explaining the ANALYTICAL THOUGHT PROCESS:

**Paragraph 1 - Discovery & Pattern Recognition:**
What key themes, patterns, or data points emerged from the sources? How did
different sources complement or contradict each other?

**Paragraph 2 - Synthesis & Connections:**
How were different pieces of information connected together? What insights
emerged from comparing or combining data from multiple sources?

**Paragraph 3 - Report Structure Decisions:**
Why was the report organized this way? How did the data inform which sections
to create?

**Paragraph 4 - Value & Insights:**
What key insights emerged that weren't obvious from any single source? How
does the synthesized report provide more value than the raw sources?

Write as if you're explaining your reasoning to a colleague. Be specific about
what you learned from the data and how it shaped the analysis. DO NOT just
list what was found. EXPLAIN the thinking process behind analysis and
synthesis. Never recite raw statistics - always explain reasoning.

Generate the analytical summary:"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scrape_result, StubModel};

    #[tokio::test]
    async fn summary_passes_through() {
        let model = Arc::new(StubModel::new(vec![
            "The data revealed converging growth estimates across sources.".to_string(),
        ]));
        let analyst = AnalysisSummarizer::new(model);

        let summary = analyst
            .summarize("q", &Vec::new(), &[], &serde_json::json!({}), "# Report")
            .await;
        assert!(summary.contains("converging growth"));
    }

    #[tokio::test]
    async fn failure_yields_placeholder() {
        let analyst = AnalysisSummarizer::new(Arc::new(StubModel::failing()));
        let summary = analyst
            .summarize("q", &Vec::new(), &[], &serde_json::json!({}), "# Report")
            .await;
        assert_eq!(summary, ANALYSIS_PLACEHOLDER);
    }

    #[test]
    fn headings_skip_title_and_body_lines() {
        let body = "# Title\n\n## Summary\ntext\n### Sub\n## Findings\n";
        let headings = extract_headings(body);
        assert_eq!(headings, vec!["## Summary", "### Sub", "## Findings"]);
    }

    #[test]
    fn prompt_ranks_sources_by_score() {
        let scrapes = vec![
            scrape_result("https://low.example", "low chunk", 0.2),
            scrape_result("https://high.example", "high chunk", 0.95),
        ];
        let prompt = build_analysis_prompt("q", &scrapes, &serde_json::json!({}), "# R");

        let high_pos = prompt.find("https://high.example").unwrap();
        let low_pos = prompt.find("https://low.example").unwrap();
        assert!(high_pos < low_pos);
    }

    #[test]
    fn prompt_samples_at_most_five_data_keys() {
        let bag = serde_json::json!({
            "a": 1, "b": 2, "c": 3, "d": 4, "e": 5, "f": 6, "g": 7
        });
        let prompt = build_analysis_prompt("q", &[], &bag, "# R");
        let count = prompt.matches("\": \"").count();
        assert_eq!(count, 5);
    }
}
