//! Data extractor — fuses search snippets and scraped chunks/tables into a
//! structured JSON bag. The bag is opaque downstream; the only promises are
//! that it parses as JSON and its top-level keys are stable strings.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use llm_client::{
    util::{strip_code_blocks, truncate_to_char_boundary},
    CompletionRequest, LanguageModel,
};
use trawler_common::types::ScrapeResult;

use crate::search::SearchMap;

const EXTRACTION_DEADLINE: Duration = Duration::from_secs(90);
const CHUNK_CAP: usize = 2_000;
const TABLE_JSON_CAP: usize = 1_000;

pub struct DataExtractor {
    model: Arc<dyn LanguageModel>,
}

impl DataExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Extract structured data from everything the job has gathered.
    /// Deadline, parse failure, and model failure all degrade to an empty
    /// bag — extraction is never worth failing a job over.
    pub async fn extract(
        &self,
        search_map: &SearchMap,
        scrape_results: &[ScrapeResult],
        data_types: &[String],
        user_query: &str,
    ) -> serde_json::Value {
        let prompt = build_extraction_prompt(search_map, scrape_results, data_types, user_query);
        let request = CompletionRequest::new(prompt)
            .max_tokens(4000)
            .temperature(0.3)
            .deadline(EXTRACTION_DEADLINE);

        let response = match self.model.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Extraction failed or timed out, continuing without structured data");
                return serde_json::json!({});
            }
        };

        let cleaned = strip_code_blocks(&response);
        match serde_json::from_str::<serde_json::Value>(cleaned) {
            Ok(bag) if bag.is_object() => {
                let keys = bag.as_object().map(|o| o.len()).unwrap_or(0);
                info!(keys, "Extracted structured data");
                bag
            }
            Ok(_) => {
                warn!("Extraction returned non-object JSON, discarding");
                serde_json::json!({})
            }
            Err(e) => {
                warn!(error = %e, "Extraction returned invalid JSON, discarding");
                serde_json::json!({})
            }
        }
    }
}

fn build_extraction_prompt(
    search_map: &SearchMap,
    scrape_results: &[ScrapeResult],
    data_types: &[String],
    user_query: &str,
) -> String {
    let mut results_context = String::new();
    for (query, results) in search_map {
        results_context.push_str(&format!("\n\n=== Search: {query} ===\n"));
        for (i, result) in results.iter().enumerate() {
            results_context.push_str(&format!("\n{}. {}\n   {}\n", i + 1, result.title, result.snippet));
        }
    }

    let mut scraped_context = String::new();
    let successful: Vec<&ScrapeResult> =
        scrape_results.iter().filter(|s| s.is_successful()).collect();
    if !successful.is_empty() {
        scraped_context.push_str("\n\n=== SCRAPED CONTENT ===\n");
        for (i, scrape) in successful.iter().enumerate() {
            scraped_context.push_str(&format!("\n--- Source {}: {} ---\n", i + 1, scrape.url));
            scraped_context.push_str(&format!("Relevance Score: {:.2}\n", scrape.score));

            scraped_context.push_str(&format!(
                "\nContent (chunk {}/{}):\n{}\n",
                scrape.chunk_index,
                scrape.total_chunks,
                truncate_to_char_boundary(&scrape.best_chunk, CHUNK_CAP)
            ));

            if !scrape.tables.is_empty() {
                scraped_context.push_str(&format!("\nTables Found: {}\n", scrape.tables_count));
                for (j, table) in scrape.tables.iter().enumerate() {
                    let table_json =
                        serde_json::to_string_pretty(table).unwrap_or_else(|_| "{}".to_string());
                    scraped_context.push_str(&format!(
                        "\nTable {}:\n{}\n",
                        j + 1,
                        truncate_to_char_boundary(&table_json, TABLE_JSON_CAP)
                    ));
                }
            }
        }
    }

    format!(
        r#"Extract structured data from these search results and scraped web pages.

USER REQUEST: {user_query}
DATA TYPES NEEDED: {data_types}

SEARCH RESULTS:
{results_context}
{scraped_context}

TASK: Extract and structure the data found in these results.

RULES:
1. Extract SPECIFIC VALUES: numbers, percentages, dates, names
2. Create a well-structured JSON object
3. Include source attribution (URL) where possible
4. Parse dates into standard format (YYYY-MM-DD)
5. Convert text descriptions to actual values
6. Organize data logically by category/entity
7. PRIORITIZE data from scraped content (best_chunk and tables) as it's more complete
8. Extract tabular data into structured arrays/objects
9. Preserve numerical precision from tables

Extract ALL relevant data from both search snippets and scraped content above.
When the same value appears in both a table and a snippet, use the table value.
Return ONLY valid JSON, no explanations.

Your extracted JSON:"#,
        data_types = data_types.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scrape_result, search_hit, StubModel};

    fn inputs() -> (SearchMap, Vec<ScrapeResult>) {
        let search_map = vec![(
            "gdp growth 2026".to_string(),
            vec![search_hit("https://stats.example", "GDP grew 2.1% in Q1")],
        )];
        let scrapes = vec![scrape_result("https://stats.example/full", "GDP table…", 0.93)];
        (search_map, scrapes)
    }

    #[tokio::test]
    async fn valid_json_object_becomes_the_bag() {
        let (search_map, scrapes) = inputs();
        let model = Arc::new(StubModel::new(vec![
            r#"{"gdp": {"us": "2.1%", "source": "https://stats.example"}}"#.to_string(),
        ]));
        let extractor = DataExtractor::new(model);

        let bag = extractor
            .extract(&search_map, &scrapes, &["statistics".into()], "compare gdp")
            .await;
        assert_eq!(bag["gdp"]["us"], "2.1%");
    }

    #[tokio::test]
    async fn fenced_json_is_accepted() {
        let (search_map, scrapes) = inputs();
        let model = Arc::new(StubModel::new(vec![
            "```json\n{\"a\": 1}\n```".to_string(),
        ]));
        let extractor = DataExtractor::new(model);

        let bag = extractor.extract(&search_map, &scrapes, &[], "q").await;
        assert_eq!(bag["a"], 1);
    }

    #[tokio::test]
    async fn model_failure_yields_empty_bag() {
        let (search_map, scrapes) = inputs();
        let extractor = DataExtractor::new(Arc::new(StubModel::failing()));

        let bag = extractor.extract(&search_map, &scrapes, &[], "q").await;
        assert_eq!(bag, serde_json::json!({}));
    }

    #[tokio::test]
    async fn invalid_json_yields_empty_bag() {
        let (search_map, scrapes) = inputs();
        let model = Arc::new(StubModel::new(vec!["not json".to_string()]));
        let extractor = DataExtractor::new(model);

        let bag = extractor.extract(&search_map, &scrapes, &[], "q").await;
        assert_eq!(bag, serde_json::json!({}));
    }

    #[tokio::test]
    async fn non_object_json_yields_empty_bag() {
        let (search_map, scrapes) = inputs();
        let model = Arc::new(StubModel::new(vec!["[1, 2, 3]".to_string()]));
        let extractor = DataExtractor::new(model);

        let bag = extractor.extract(&search_map, &scrapes, &[], "q").await;
        assert_eq!(bag, serde_json::json!({}));
    }

    #[test]
    fn prompt_skips_failed_scrapes_and_truncates() {
        let search_map = vec![(
            "q1".to_string(),
            vec![search_hit("https://a.example", "snippet one")],
        )];
        let long_chunk = "x".repeat(5_000);
        let mut ok = scrape_result("https://ok.example", &long_chunk, 0.9);
        ok.tables = vec![serde_json::json!({"rows": ["r1", "r2"]})];
        ok.tables_count = 1;
        let failed = ScrapeResult::failed("https://bad.example", "HTTP 503");

        let prompt = build_extraction_prompt(&search_map, &[ok, failed], &["statistics".into()], "q");

        assert!(prompt.contains("https://ok.example"));
        assert!(!prompt.contains("https://bad.example"));
        assert!(prompt.contains("Tables Found: 1"));
        // chunk is capped well below its original length
        assert!(prompt.len() < 4_000 + long_chunk.len());
    }
}
