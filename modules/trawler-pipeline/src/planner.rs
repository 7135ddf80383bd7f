//! Query planner — turns one user prompt plus prior turns into a research
//! plan: whether to search, which angles to search, what data to extract.
//!
//! The model is asked for a strict JSON envelope, but responses arrive in
//! every shape a chat model can produce: fenced, single-quoted, Python
//! booleans, half-valid. Parsing degrades through four rungs (strict parse,
//! literal coercion, regex recovery, verbatim-query fallback) and never
//! fails — downstream stages tolerate tiny or empty query sets.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use regex::Regex;
use tracing::{info, warn};

use llm_client::{util::strip_code_blocks, CompletionRequest, LanguageModel};
use trawler_common::types::ResearchPlan;

const PLAN_TIMEOUT: Duration = Duration::from_secs(60);

/// Current-date tokens stamped into the prompt and used to rewrite temporal
/// keywords. Injected so the scrubbing rules are testable with fixed dates.
#[derive(Debug, Clone)]
pub struct DateContext {
    /// Human-readable date, e.g. "August 01, 2026".
    pub today: String,
    pub current_year: i32,
}

impl DateContext {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            today: now.format("%B %d, %Y").to_string(),
            current_year: now.year(),
        }
    }
}

pub struct QueryPlanner {
    model: Arc<dyn LanguageModel>,
}

impl QueryPlanner {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Produce a research plan. Never errors; the worst outcome is a plan
    /// that searches the user's own words verbatim.
    pub async fn plan(&self, user_query: &str, prior_queries: &[String]) -> ResearchPlan {
        self.plan_with_dates(user_query, prior_queries, &DateContext::now())
            .await
    }

    pub async fn plan_with_dates(
        &self,
        user_query: &str,
        prior_queries: &[String],
        dates: &DateContext,
    ) -> ResearchPlan {
        let prompt = build_prompt(user_query, prior_queries, dates);
        let request = CompletionRequest::new(prompt)
            .max_tokens(1000)
            .temperature(0.3)
            .deadline(PLAN_TIMEOUT);

        let response = match self.model.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Planner model call failed, using fallback plan");
                return ResearchPlan::fallback(user_query);
            }
        };

        let mut plan = parse_plan(&response, user_query);
        let scrubbed: Vec<String> = plan
            .search_queries
            .iter()
            .map(|q| scrub_query_dates(q, user_query, dates))
            .filter(|q| !q.is_empty())
            .collect();
        plan.search_queries = scrubbed;

        // Scrubbing can empty a query out entirely; keep the plan runnable.
        if plan.web_search_needed && plan.search_queries.is_empty() {
            plan.search_queries = vec![user_query.to_string()];
        }

        info!(
            web_search_needed = plan.web_search_needed,
            queries = plan.search_queries.len(),
            data_extraction = plan.data_extraction_needed,
            "Research plan ready"
        );
        plan
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

fn build_prompt(user_query: &str, prior_queries: &[String], dates: &DateContext) -> String {
    let mut context = String::new();
    if !prior_queries.is_empty() {
        context.push_str("\n\nPrevious queries in this conversation:\n");
        let recent = &prior_queries[prior_queries.len().saturating_sub(3)..];
        for (i, prev) in recent.iter().enumerate() {
            context.push_str(&format!("{}. {}\n", i + 1, prev));
        }
    }

    format!(
        r#"Analyze this user query and determine the best search strategy.

TODAY'S DATE: {today} (current year: {year})

USER QUERY: "{user_query}"{context}

YOUR TASK: Return a JSON object with this EXACT structure:

{{
    "web_search_needed": true,
    "search_queries": [
        "specific search query 1",
        "specific search query 2",
        "specific search query 3"
    ],
    "data_extraction_needed": true,
    "data_types": ["statistics", "comparisons", "trends"]
}}

RULES:
1. web_search_needed: true whenever the query involves real-time or current
   information, live dashboards or trackers, specific dates, statistics,
   comparisons across entities, news, or geographic data. False only for
   purely creative or opinion tasks.
2. search_queries: List 3-5 specific, targeted search queries of 3-7 words
   each (NOT the original query). Prefer the current year {year} over any
   year remembered from training.
3. data_extraction_needed: true if expecting structured data (numbers,
   tables, comparisons)
4. data_types: List what data to extract: ["statistics", "dates", "names",
   "prices", etc]

IMPORTANT:
- Return ONLY valid JSON, no explanations
- Use double quotes, not single quotes
- Use lowercase true/false, not True/False
- Make search queries specific and targeted
- If no web search needed, return empty search_queries array

Examples:

Query: "What's the weather in Paris?"
{{
    "web_search_needed": true,
    "search_queries": ["Paris weather current", "Paris temperature today"],
    "data_extraction_needed": true,
    "data_types": ["temperature", "conditions"]
}}

Query: "Write me a poem about cats"
{{
    "web_search_needed": false,
    "search_queries": [],
    "data_extraction_needed": false,
    "data_types": []
}}

Now analyze the user's query and return ONLY the JSON:"#,
        today = dates.today,
        year = dates.current_year,
    )
}

// ---------------------------------------------------------------------------
// Response parsing — strict parse, coercion, regex recovery, fallback
// ---------------------------------------------------------------------------

fn parse_plan(response: &str, user_query: &str) -> ResearchPlan {
    let cleaned = strip_code_blocks(response);
    let coerced = coerce_python_literals(cleaned);

    let value = match serde_json::from_str::<serde_json::Value>(&coerced) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Plan response is not valid JSON, trying regex recovery");
            match recover_with_regex(&coerced, user_query) {
                Some(value) => value,
                None => {
                    warn!("Regex recovery failed, using fallback plan");
                    return ResearchPlan::fallback(user_query);
                }
            }
        }
    };

    normalize_plan(value, user_query)
}

/// Rewrite Python literal notation into JSON: single quotes to double
/// quotes, `True`/`False`/`None` to their JSON spellings.
fn coerce_python_literals(text: &str) -> String {
    text.replace('\'', "\"")
        .replace("True", "true")
        .replace("False", "false")
        .replace("None", "null")
}

/// Pull the two load-bearing fields out of near-JSON with regexes.
fn recover_with_regex(text: &str, user_query: &str) -> Option<serde_json::Value> {
    let bool_re = Regex::new(r#"(?i)"web_search_needed"\s*:\s*(true|false)"#).ok()?;
    let web_search_needed = bool_re
        .captures(text)
        .map(|c| c[1].eq_ignore_ascii_case("true"))
        .unwrap_or(true);

    let queries_re = Regex::new(r#"(?s)"search_queries"\s*:\s*\[(.*?)\]"#).ok()?;
    let string_re = Regex::new(r#""([^"]+)""#).ok()?;

    let mut search_queries: Vec<String> = Vec::new();
    if let Some(captures) = queries_re.captures(text) {
        for m in string_re.captures_iter(&captures[1]) {
            search_queries.push(m[1].to_string());
        }
    }

    if search_queries.is_empty() && web_search_needed {
        search_queries.push(user_query.to_string());
    }

    Some(serde_json::json!({
        "web_search_needed": web_search_needed,
        "search_queries": search_queries,
        "data_extraction_needed": true,
        "data_types": ["general"],
    }))
}

/// Normalize the loosely-typed envelope: stringy booleans, scalar queries,
/// empty entries.
fn normalize_plan(value: serde_json::Value, user_query: &str) -> ResearchPlan {
    let web_search_needed = normalize_bool(value.get("web_search_needed"), true);
    let data_extraction_needed = normalize_bool(value.get("data_extraction_needed"), false);

    let mut search_queries: Vec<String> = match value.get("search_queries") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(serde_json::Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    };
    search_queries.retain(|q| !q.trim().is_empty());

    let data_types: Vec<String> = match value.get("data_types") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    if web_search_needed && search_queries.is_empty() {
        warn!("Plan had no search queries, searching the user query verbatim");
        search_queries.push(user_query.to_string());
    }

    ResearchPlan {
        web_search_needed,
        search_queries,
        data_extraction_needed,
        data_types,
    }
}

fn normalize_bool(value: Option<&serde_json::Value>, default: bool) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => {
            matches!(s.to_lowercase().as_str(), "true" | "1" | "yes")
        }
        _ => default,
    }
}

// ---------------------------------------------------------------------------
// Year scrubbing
// ---------------------------------------------------------------------------

const MONTHS: &str =
    "january|february|march|april|may|june|july|august|september|october|november|december";

/// Replace temporal keywords with concrete current-date tokens and excise
/// stale 2020-2024 year literals a model may have carried over from
/// training. Years the user typed themselves are left alone, as are
/// explicit multi-year ranges like "2023-2025".
pub fn scrub_query_dates(query: &str, user_query: &str, dates: &DateContext) -> String {
    let year_str = dates.current_year.to_string();

    let mut cleaned = query
        .replace("today", &dates.today)
        .replace("Today", &dates.today)
        .replace("this year", &year_str)
        .replace("current year", &year_str);

    // "October 5 2023" / "October 5, 2023"
    let month_day_year =
        Regex::new(&format!(r"(?i)\b(?:{MONTHS})\s+\d{{1,2}}[,\s]+202[0-4]\b")).unwrap();
    cleaned = scrub_matches(&month_day_year, &cleaned, user_query);

    // "5 October 2023"
    let day_month_year =
        Regex::new(&format!(r"(?i)\b\d{{1,2}}\s+(?:{MONTHS})\s+202[0-4]\b")).unwrap();
    cleaned = scrub_matches(&day_month_year, &cleaned, user_query);

    // "2023-10-05" / "2023/10/05"
    let iso_date = Regex::new(r"\b202[0-4][-/]\d{2}[-/]\d{2}\b").unwrap();
    cleaned = scrub_matches(&iso_date, &cleaned, user_query);

    // Bare year. The regex crate has no lookahead, so the range suffix is
    // captured and kept when present.
    let bare_year = Regex::new(r"\b(202[0-4])(\s*[-\u{2013}]\s*\d{4})?\b").unwrap();
    cleaned = bare_year
        .replace_all(&cleaned, |caps: &regex::Captures| {
            if caps.get(2).is_some() || user_query.contains(&caps[1]) {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed != query {
        info!(original = query, cleaned = %collapsed, "Scrubbed stale dates from query");
    }
    collapsed
}

fn scrub_matches(re: &Regex, text: &str, user_query: &str) -> String {
    re.replace_all(text, |caps: &regex::Captures| {
        if user_query.contains(&caps[0]) {
            caps[0].to_string()
        } else {
            String::new()
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubModel;

    fn dates() -> DateContext {
        DateContext {
            today: "August 01, 2026".to_string(),
            current_year: 2026,
        }
    }

    fn plan_json() -> String {
        serde_json::json!({
            "web_search_needed": true,
            "search_queries": ["US GDP growth 2026", "China GDP growth 2026"],
            "data_extraction_needed": true,
            "data_types": ["statistics", "economic_indicators"],
        })
        .to_string()
    }

    #[tokio::test]
    async fn plan_round_trips_through_echoing_model() {
        let model = Arc::new(StubModel::new(vec![plan_json()]));
        let planner = QueryPlanner::new(model);

        let plan = planner
            .plan_with_dates("Compare GDP of US vs China", &[], &dates())
            .await;

        assert!(plan.web_search_needed);
        assert_eq!(
            plan.search_queries,
            vec!["US GDP growth 2026", "China GDP growth 2026"]
        );
        assert!(plan.data_extraction_needed);
        assert_eq!(plan.data_types, vec!["statistics", "economic_indicators"]);
    }

    #[tokio::test]
    async fn fenced_response_is_stripped() {
        let fenced = format!("```json\n{}\n```", plan_json());
        let model = Arc::new(StubModel::new(vec![fenced]));
        let planner = QueryPlanner::new(model);

        let plan = planner.plan_with_dates("gdp", &[], &dates()).await;
        assert_eq!(plan.search_queries.len(), 2);
    }

    #[tokio::test]
    async fn python_literals_are_coerced() {
        let pythonic = "{'web_search_needed': True, 'search_queries': ['ai news'], \
                        'data_extraction_needed': False, 'data_types': []}";
        let model = Arc::new(StubModel::new(vec![pythonic.to_string()]));
        let planner = QueryPlanner::new(model);

        let plan = planner.plan_with_dates("ai news", &[], &dates()).await;
        assert!(plan.web_search_needed);
        assert_eq!(plan.search_queries, vec!["ai news"]);
        assert!(!plan.data_extraction_needed);
    }

    #[tokio::test]
    async fn regex_recovery_salvages_broken_json() {
        let broken = r#"Sure! Here is the plan:
        "web_search_needed": true,
        "search_queries": ["solar capacity growth", "renewable energy share"],
        trailing garbage"#;
        let model = Arc::new(StubModel::new(vec![broken.to_string()]));
        let planner = QueryPlanner::new(model);

        let plan = planner.plan_with_dates("solar energy", &[], &dates()).await;
        assert!(plan.web_search_needed);
        assert_eq!(
            plan.search_queries,
            vec!["solar capacity growth", "renewable energy share"]
        );
        assert_eq!(plan.data_types, vec!["general"]);
    }

    #[tokio::test]
    async fn unparseable_response_falls_back_to_user_query() {
        let model = Arc::new(StubModel::new(vec!["no json here at all".to_string()]));
        let planner = QueryPlanner::new(model);

        let plan = planner
            .plan_with_dates("bitcoin price outlook", &[], &dates())
            .await;
        assert!(plan.web_search_needed);
        assert_eq!(plan.search_queries, vec!["bitcoin price outlook"]);
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_user_query() {
        let model = Arc::new(StubModel::failing());
        let planner = QueryPlanner::new(model);

        let plan = planner.plan_with_dates("market news", &[], &dates()).await;
        assert_eq!(plan.search_queries, vec!["market news"]);
    }

    #[tokio::test]
    async fn stringy_booleans_and_scalar_queries_normalize() {
        let sloppy = r#"{
            "web_search_needed": "true",
            "search_queries": "inflation rate",
            "data_extraction_needed": "yes",
            "data_types": []
        }"#;
        let model = Arc::new(StubModel::new(vec![sloppy.to_string()]));
        let planner = QueryPlanner::new(model);

        let plan = planner.plan_with_dates("inflation", &[], &dates()).await;
        assert!(plan.web_search_needed);
        assert_eq!(plan.search_queries, vec!["inflation rate"]);
        assert!(plan.data_extraction_needed);
    }

    #[tokio::test]
    async fn empty_queries_are_dropped() {
        let json = r#"{
            "web_search_needed": true,
            "search_queries": ["  ", "real query", ""],
            "data_extraction_needed": false,
            "data_types": []
        }"#;
        let model = Arc::new(StubModel::new(vec![json.to_string()]));
        let planner = QueryPlanner::new(model);

        let plan = planner.plan_with_dates("q", &[], &dates()).await;
        assert_eq!(plan.search_queries, vec!["real query"]);
    }

    #[tokio::test]
    async fn no_search_plan_stays_empty() {
        let json = r#"{
            "web_search_needed": false,
            "search_queries": [],
            "data_extraction_needed": false,
            "data_types": []
        }"#;
        let model = Arc::new(StubModel::new(vec![json.to_string()]));
        let planner = QueryPlanner::new(model);

        let plan = planner.plan_with_dates("write a poem", &[], &dates()).await;
        assert!(!plan.web_search_needed);
        assert!(plan.search_queries.is_empty());
    }

    // --- year scrubbing ---

    #[test]
    fn temporal_keywords_become_concrete_dates() {
        let cleaned = scrub_query_dates("oil price today", "oil price", &dates());
        assert_eq!(cleaned, "oil price August 01, 2026");

        let cleaned = scrub_query_dates("GDP growth this year", "gdp", &dates());
        assert_eq!(cleaned, "GDP growth 2026");
    }

    #[test]
    fn stale_bare_years_are_excised() {
        let cleaned = scrub_query_dates("election results 2023", "election results", &dates());
        assert_eq!(cleaned, "election results");
    }

    #[test]
    fn multi_year_ranges_survive() {
        let cleaned = scrub_query_dates("revenue trends 2023-2025", "revenue", &dates());
        assert_eq!(cleaned, "revenue trends 2023-2025");

        let cleaned = scrub_query_dates("growth 2023\u{2013}2025", "growth", &dates());
        assert_eq!(cleaned, "growth 2023\u{2013}2025");
    }

    #[test]
    fn user_supplied_years_survive() {
        let cleaned = scrub_query_dates(
            "olympics medal table 2024",
            "show me the 2024 olympics medal table",
            &dates(),
        );
        assert_eq!(cleaned, "olympics medal table 2024");
    }

    #[test]
    fn full_dates_are_excised() {
        let cleaned = scrub_query_dates("weather October 5, 2023 forecast", "weather", &dates());
        assert_eq!(cleaned, "weather forecast");

        let cleaned = scrub_query_dates("report 2023-10-05 summary", "report", &dates());
        assert_eq!(cleaned, "report summary");

        let cleaned = scrub_query_dates("events 5 october 2022 schedule", "events", &dates());
        assert_eq!(cleaned, "events schedule");
    }

    #[test]
    fn recent_years_are_untouched() {
        let cleaned = scrub_query_dates("forecast 2026 outlook", "forecast", &dates());
        assert_eq!(cleaned, "forecast 2026 outlook");

        let cleaned = scrub_query_dates("history of 2019 crisis", "history", &dates());
        assert_eq!(cleaned, "history of 2019 crisis");
    }
}
