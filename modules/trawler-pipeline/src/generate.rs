//! Artifact generator — renders the job's evidence into the final document,
//! either a Markdown report or a self-contained HTML application.
//!
//! Contract: exactly one artifact per run; the conversation history gains
//! one user turn and one short assistant summary turn (never the artifact
//! body). Structural failures retry once; semantic quality does not.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use llm_client::{
    util::{strip_code_blocks, truncate_to_char_boundary},
    CompletionRequest, LanguageModel,
};
use trawler_common::history::ConversationHistory;
use trawler_common::types::{Artifact, ArtifactKind, ScrapeResult};

use crate::search::SearchMap;

const GENERATION_MAX_TOKENS: u32 = 16_000;
const GENERATION_TEMPERATURE: f32 = 0.7;
const CHUNK_CAP: usize = 3_000;
const TABLE_JSON_CAP: usize = 2_000;

/// Library names that must not appear in a self-contained HTML artifact.
const DISALLOWED_CHART_LIBS: &[&str] = &["chart.js", "highcharts", "d3.min", "plotly", "echarts"];

pub struct ArtifactGenerator {
    model: Arc<dyn LanguageModel>,
    mode: ArtifactKind,
}

impl ArtifactGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, mode: ArtifactKind) -> Self {
        Self { model, mode }
    }

    pub fn mode(&self) -> ArtifactKind {
        self.mode
    }

    /// Generate the artifact and record the turn pair in the history.
    pub async fn generate(
        &self,
        user_query: &str,
        search_map: &SearchMap,
        scrape_results: &[ScrapeResult],
        data_bag: &serde_json::Value,
        lab_mode: bool,
        history: &mut ConversationHistory,
    ) -> Result<Artifact> {
        let prompt = match self.mode {
            ArtifactKind::Markdown => {
                build_markdown_prompt(user_query, search_map, scrape_results, data_bag, history)
            }
            ArtifactKind::Html => build_html_prompt(
                user_query,
                search_map,
                scrape_results,
                data_bag,
                lab_mode,
                history,
            ),
        };
        let system = match self.mode {
            ArtifactKind::Markdown => MARKDOWN_SYSTEM_PROMPT,
            ArtifactKind::Html => HTML_SYSTEM_PROMPT,
        };

        let mut body = self.complete(system, &prompt).await?;
        if !self.structurally_sound(&body) {
            warn!("Generator output structurally broken, retrying once");
            body = self.complete(system, &prompt).await?;
            if !self.structurally_sound(&body) {
                return Err(anyhow!("Generator produced structurally broken output twice"));
            }
        }

        let body = match self.mode {
            ArtifactKind::Markdown => cleanup_markdown(&body),
            ArtifactKind::Html => cleanup_html(&body),
        };

        info!(
            kind = ?self.mode,
            bytes = body.len(),
            "Generated artifact"
        );

        history.push_user(user_query);
        history.push_assistant_summary(build_summary(
            self.mode,
            search_map,
            scrape_results,
            data_bag,
        ));
        history.set_prior_artifact(body.clone());

        Ok(Artifact {
            kind: self.mode,
            body,
        })
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = CompletionRequest::new(prompt.to_string())
            .system(system.to_string())
            .max_tokens(GENERATION_MAX_TOKENS)
            .temperature(GENERATION_TEMPERATURE);
        self.model.complete(request).await
    }

    /// Structural check only: empty output always fails; an HTML body that
    /// opened an html tag but never closed it counts as truncated.
    fn structurally_sound(&self, body: &str) -> bool {
        let cleaned = strip_code_blocks(body);
        if cleaned.is_empty() {
            return false;
        }
        if self.mode == ArtifactKind::Html {
            let lower = cleaned.to_lowercase();
            if lower.contains("<html") && !lower.contains("</html>") {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

fn cleanup_markdown(body: &str) -> String {
    let cleaned = strip_code_blocks(body);

    if cleaned.starts_with('#') {
        cleaned.to_string()
    } else {
        warn!("Generated content doesn't look like Markdown, wrapping with header");
        format!("# Generated Report\n\n{cleaned}")
    }
}

fn cleanup_html(body: &str) -> String {
    let cleaned = strip_code_blocks(body);
    let lower = cleaned.to_lowercase();

    for lib in DISALLOWED_CHART_LIBS {
        if lower.contains(lib) {
            warn!(library = lib, "Generated HTML references a charting library");
        }
    }

    if lower.starts_with("<!doctype") || lower.starts_with("<html") {
        cleaned.to_string()
    } else {
        warn!("Generated content doesn't look like HTML, wrapping");
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Generated Report</title>
</head>
<body>
{cleaned}
</body>
</html>"#
        )
    }
}

// ---------------------------------------------------------------------------
// Assistant summary
// ---------------------------------------------------------------------------

fn build_summary(
    kind: ArtifactKind,
    search_map: &SearchMap,
    scrape_results: &[ScrapeResult],
    data_bag: &serde_json::Value,
) -> String {
    let mut summary = match kind {
        ArtifactKind::Markdown => "Generated Markdown report with requested features.".to_string(),
        ArtifactKind::Html => "Generated HTML application with requested features.".to_string(),
    };

    if !search_map.is_empty() {
        let total: usize = search_map.iter().map(|(_, hits)| hits.len()).sum();
        summary.push_str(&format!(
            " Used {} search queries with {} results.",
            search_map.len(),
            total
        ));
    }
    let successful = scrape_results.iter().filter(|s| s.is_successful()).count();
    if successful > 0 {
        let tables: i64 = scrape_results.iter().map(|s| s.tables_count).sum();
        summary.push_str(&format!(
            " Scraped {successful} pages with {tables} tables extracted."
        ));
    }
    if let Some(obj) = data_bag.as_object() {
        if !obj.is_empty() {
            summary.push_str(&format!(
                " Extracted structured data with {} data categories.",
                obj.len()
            ));
        }
    }

    summary
}

// ---------------------------------------------------------------------------
// Context blocks
// ---------------------------------------------------------------------------

fn build_search_context(search_map: &SearchMap) -> String {
    if search_map.is_empty() {
        return String::new();
    }
    let mut context = String::from("\n\n=== WEB SEARCH RESULTS ===\n");
    for (query, results) in search_map {
        context.push_str(&format!("\nQuery: {query}\n"));
        for (i, result) in results.iter().enumerate() {
            context.push_str(&format!(
                "\n{}. {}\n   URL: {}\n   Snippet: {}\n",
                i + 1,
                result.title,
                result.url,
                result.snippet
            ));
        }
    }
    context
}

fn build_scraped_context(scrape_results: &[ScrapeResult]) -> String {
    let successful: Vec<&ScrapeResult> =
        scrape_results.iter().filter(|s| s.is_successful()).collect();
    if successful.is_empty() {
        return String::new();
    }

    let mut context = String::from("\n\n=== SCRAPED WEB CONTENT (FULL DEPTH) ===\n");
    context.push_str("This is the complete content extracted from web pages.\n");

    for (i, scrape) in successful.iter().enumerate() {
        context.push_str(&format!("\n--- Source {}: {} ---\n", i + 1, scrape.url));
        context.push_str(&format!("Relevance Score: {:.2}\n", scrape.score));
        context.push_str(&format!("Word Count: {}\n", scrape.word_count));

        context.push_str("\nMost Relevant Content:\n");
        context.push_str(truncate_to_char_boundary(&scrape.best_chunk, CHUNK_CAP));
        context.push('\n');

        if !scrape.tables.is_empty() {
            context.push_str(&format!(
                "\nExtracted Tables ({} total):\n",
                scrape.tables_count
            ));
            for (j, table) in scrape.tables.iter().enumerate() {
                let table_json =
                    serde_json::to_string_pretty(table).unwrap_or_else(|_| "{}".to_string());
                context.push_str(&format!(
                    "\nTable {}:\n{}\n",
                    j + 1,
                    truncate_to_char_boundary(&table_json, TABLE_JSON_CAP)
                ));
            }
        }
    }
    context
}

fn build_structured_context(data_bag: &serde_json::Value) -> String {
    match data_bag.as_object() {
        Some(obj) if !obj.is_empty() => {
            let json =
                serde_json::to_string_pretty(data_bag).unwrap_or_else(|_| "{}".to_string());
            format!(
                "\n\n=== EXTRACTED STRUCTURED DATA ===\n{json}\n\nThis is pre-extracted, \
                 structured data. Use these exact values in your report."
            )
        }
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

const MARKDOWN_SYSTEM_PROMPT: &str = r#"You are an expert technical writer and data analyst creating comprehensive Markdown reports.

CRITICAL RULES:
1. Output ONLY complete Markdown - no explanations, no code blocks around the markdown
2. Create rich, well-formatted Markdown with proper headers, lists, emphasis, and links
3. Professional, clear, and informative writing style
4. Include all relevant data and insights from provided sources

DATA USAGE RULES (MOST IMPORTANT):
5. If SCRAPED WEB CONTENT is provided, it contains full article text and extracted
   tables. best_chunk holds the most relevant excerpts from each source. These are
   real values, not examples - use them directly.
6. If EXTRACTED STRUCTURED DATA is provided, it is pre-parsed, ready-to-use JSON.
   Use these EXACT values in your report.
7. If WEB SEARCH RESULTS are provided, use them for context, citations, and
   additional data points. Include source URLs as Markdown links: [Title](URL).
8. Create CONTENT-RICH reports: real numbers, narrative sections with insights from
   the source material, explanatory commentary alongside every dataset.

SVG VISUALIZATION REQUIREMENTS:
9. Alongside each dataset's table, embed an SVG visualization directly in the
   Markdown (no code blocks around it):
   - Bar charts for categorical comparisons
   - Line charts for time series and trends
   - Pie/donut charts for proportions
10. SVG technical rules: use viewBox for responsiveness, include labels,
    legends, titles, and axes, readable fonts (12-16px), dark text on light
    backgrounds.

MARKDOWN FORMATTING:
- # for the single main title, ## for major sections, ### for subsections
- **bold** for emphasis, [text](url) for all links
- > for blockquotes when citing key excerpts
- --- for horizontal rules between major sections"#;

const HTML_SYSTEM_PROMPT: &str = r#"You are an expert web developer who creates beautiful, modern, self-contained HTML applications from research data.

CRITICAL RULES:
1. Output ONLY a complete HTML document: doctype through closing html tag
2. ALL styles go in a single <style> block in the head
3. NO external script, style, or font references of any kind
4. NO runtime charting libraries (no chart.js, highcharts, d3, plotly, echarts)
5. ALL visualizations must be inline SVG using only svg, rect, circle, line,
   polyline, path, text, and g elements
6. Never lose data - every piece of provided content must appear in the document"#;

fn build_markdown_prompt(
    user_query: &str,
    search_map: &SearchMap,
    scrape_results: &[ScrapeResult],
    data_bag: &serde_json::Value,
    history: &ConversationHistory,
) -> String {
    let search_context = build_search_context(search_map);
    let scraped_context = build_scraped_context(scrape_results);
    let structured_context = build_structured_context(data_bag);

    let (action, prior) = match history.prior_artifact() {
        Some(prior) => (
            "Update the following Markdown report based on this request",
            format!("\n\nCURRENT MARKDOWN REPORT:\n{prior}\n"),
        ),
        None => (
            "Create a comprehensive Markdown report based on this request",
            String::new(),
        ),
    };

    format!(
        r#"{action}:

USER REQUEST: {user_query}{prior}{search_context}{scraped_context}{structured_context}

COMPLETENESS RULES (MOST IMPORTANT):
1. NEVER use comments like "Additional rows omitted for brevity"
2. NEVER use placeholders like "... (more data)" or "etc."
3. NEVER use ellipses to stand in for data
4. Every table must include ALL rows from the source data - no truncation
5. If there are 10 data points, present ALL 10 - no shortcuts
6. Every SVG chart must plot EVERY data point - production-ready, not a
   skeleton example

REPORT STRUCTURE (follow this ordering exactly):
# [Report Title]

## Executive Summary
[2-3 paragraphs synthesizing key insights from all sources]

## Key Findings
- **Finding 1:** [Explanation with data]
- **Finding 2:** [Explanation with data]

## [One section per dataset]
For each dataset, present in this order:
1. [Overview paragraph explaining the data from the source material]
2. A complete Markdown table with EVERY row:

| Column A | Column B |
|----------|----------|
| Value 1  | Value 2  |

3. An SVG chart of the same data embedded directly in the Markdown:

<svg viewBox="0 0 600 400" xmlns="http://www.w3.org/2000/svg">
[complete chart with every data point, labels, and axes]
</svg>

4. **Analysis:** [Commentary explaining what the data shows and why it matters]

## Additional Insights
[Trends, patterns, implications from the articles]

## Conclusions
[Summary of key takeaways]

---

## Sources
1. [Source Title](URL) - [Brief description]

The scraped content contains hundreds of words of valuable information - use it.
Don't just extract numbers - include the surrounding analysis and commentary.

Generate the COMPLETE Markdown report (output ONLY the Markdown):"#
    )
}

fn build_html_prompt(
    user_query: &str,
    search_map: &SearchMap,
    scrape_results: &[ScrapeResult],
    data_bag: &serde_json::Value,
    lab_mode: bool,
    history: &ConversationHistory,
) -> String {
    let search_context = build_search_context(search_map);
    let scraped_context = build_scraped_context(scrape_results);
    let structured_context = build_structured_context(data_bag);

    let (action, prior) = match history.prior_artifact() {
        Some(prior) => (
            "Update the following HTML application based on this request",
            format!("\n\nCURRENT HTML APPLICATION:\n{prior}\n"),
        ),
        None => (
            "Create a complete, self-contained HTML application based on this request",
            String::new(),
        ),
    };

    let layout = if lab_mode {
        r#"LAYOUT (lab mode):
- Organize content into 4 tabs: Overview, Data Analysis, Detailed Insights, Sources
- Tab navigation with smooth transitions, hover effects, animated page load"#
    } else {
        r#"LAYOUT:
- Single scrolling page: summary, visualizations with commentary, detailed
  analysis, sources"#
    };

    format!(
        r#"{action}:

USER REQUEST: {user_query}{prior}{search_context}{scraped_context}{structured_context}

REQUIREMENTS:
1. Complete HTML document from <!DOCTYPE html> through </html>
2. All CSS inside one <style> block; no external stylesheets, scripts, or fonts
3. All charts as inline SVG (svg, rect, circle, line, polyline, path, text, g)
4. Include EVERY data point - no truncation, no placeholder rows
5. Responsive layout, professional color scheme, readable typography

{layout}

COMPLETENESS RULES:
- Convert ALL tables to HTML tables with every row
- Chart ALL data series completely
- Include ALL text, analysis, and commentary from the sources

Generate the COMPLETE HTML file.
Output ONLY the HTML (no explanations, no markdown code blocks):"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scrape_result, search_hit, StubModel};

    fn inputs() -> (SearchMap, Vec<ScrapeResult>, serde_json::Value) {
        let search_map = vec![(
            "q1".to_string(),
            vec![search_hit("https://a.example", "snippet")],
        )];
        let scrapes = vec![scrape_result("https://b.example", "chunk", 0.9)];
        let bag = serde_json::json!({"metric": {"value": 42}});
        (search_map, scrapes, bag)
    }

    #[tokio::test]
    async fn markdown_artifact_passes_through() {
        let (search_map, scrapes, bag) = inputs();
        let model = Arc::new(StubModel::new(vec!["# Report\n\nBody".to_string()]));
        let generator = ArtifactGenerator::new(model, ArtifactKind::Markdown);
        let mut history = ConversationHistory::new();

        let artifact = generator
            .generate("q", &search_map, &scrapes, &bag, false, &mut history)
            .await
            .unwrap();

        assert_eq!(artifact.kind, ArtifactKind::Markdown);
        assert!(artifact.body.starts_with("# Report"));
    }

    #[tokio::test]
    async fn non_markdown_output_is_wrapped_with_heading() {
        let (search_map, scrapes, bag) = inputs();
        let model = Arc::new(StubModel::new(vec!["just some text".to_string()]));
        let generator = ArtifactGenerator::new(model, ArtifactKind::Markdown);
        let mut history = ConversationHistory::new();

        let artifact = generator
            .generate("q", &search_map, &scrapes, &bag, false, &mut history)
            .await
            .unwrap();

        assert!(artifact.body.starts_with("# Generated Report"));
        assert!(artifact.body.contains("just some text"));
    }

    #[tokio::test]
    async fn non_html_output_is_wrapped_in_skeleton() {
        let (search_map, scrapes, bag) = inputs();
        let model = Arc::new(StubModel::new(vec!["hello".to_string()]));
        let generator = ArtifactGenerator::new(model, ArtifactKind::Html);
        let mut history = ConversationHistory::new();

        let artifact = generator
            .generate("q", &search_map, &scrapes, &bag, false, &mut history)
            .await
            .unwrap();

        let lower = artifact.body.to_lowercase();
        assert!(lower.starts_with("<!doctype"));
        assert!(artifact.body.contains("hello"));
        assert!(lower.ends_with("</html>"));
    }

    #[tokio::test]
    async fn empty_output_retries_once_then_succeeds() {
        let (search_map, scrapes, bag) = inputs();
        let model = Arc::new(StubModel::new(vec![
            "".to_string(),
            "# Recovered".to_string(),
        ]));
        let generator = ArtifactGenerator::new(model.clone(), ArtifactKind::Markdown);
        let mut history = ConversationHistory::new();

        let artifact = generator
            .generate("q", &search_map, &scrapes, &bag, false, &mut history)
            .await
            .unwrap();

        assert!(artifact.body.starts_with("# Recovered"));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn double_structural_failure_is_an_error() {
        let (search_map, scrapes, bag) = inputs();
        let model = Arc::new(StubModel::new(vec!["".to_string(), "".to_string()]));
        let generator = ArtifactGenerator::new(model, ArtifactKind::Markdown);
        let mut history = ConversationHistory::new();

        let result = generator
            .generate("q", &search_map, &scrapes, &bag, false, &mut history)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn truncated_html_close_tag_triggers_retry() {
        let (search_map, scrapes, bag) = inputs();
        let model = Arc::new(StubModel::new(vec![
            "<html><body>cut off".to_string(),
            "<!DOCTYPE html>\n<html><body>ok</body></html>".to_string(),
        ]));
        let generator = ArtifactGenerator::new(model.clone(), ArtifactKind::Html);
        let mut history = ConversationHistory::new();

        let artifact = generator
            .generate("q", &search_map, &scrapes, &bag, false, &mut history)
            .await
            .unwrap();
        assert!(artifact.body.contains("ok"));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn history_grows_by_exactly_two_turns() {
        let (search_map, scrapes, bag) = inputs();
        let model = Arc::new(StubModel::new(vec!["# Report".to_string()]));
        let generator = ArtifactGenerator::new(model, ArtifactKind::Markdown);
        let mut history = ConversationHistory::new();

        generator
            .generate("my question", &search_map, &scrapes, &bag, false, &mut history)
            .await
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].content, "my question");
        // the assistant turn is a summary, never the artifact body
        assert!(!history.turns()[1].content.starts_with('#'));
        assert!(history.turns()[1].content.contains("search queries"));
    }

    #[tokio::test]
    async fn update_mode_engages_with_prior_artifact() {
        let (search_map, scrapes, bag) = inputs();
        let model = Arc::new(StubModel::new(vec!["# Updated".to_string()]));
        let generator = ArtifactGenerator::new(model.clone(), ArtifactKind::Markdown);
        let mut history = ConversationHistory::new();
        history.set_prior_artifact("# Old Report\n\nOld body");

        generator
            .generate("refresh it", &search_map, &scrapes, &bag, false, &mut history)
            .await
            .unwrap();

        let prompt = model.last_request().unwrap().user;
        assert!(prompt.contains("Update the following Markdown report"));
        assert!(prompt.contains("# Old Report"));
        assert_eq!(history.prior_artifact(), Some("# Updated"));
    }

    #[test]
    fn summary_counts_inputs() {
        let (search_map, scrapes, bag) = inputs();
        let summary = build_summary(ArtifactKind::Markdown, &search_map, &scrapes, &bag);
        assert!(summary.contains("1 search queries with 1 results"));
        assert!(summary.contains("Scraped 1 pages"));
        assert!(summary.contains("1 data categories"));
    }
}
