//! Web search used as a general-knowledge fallback.
//!
//! Two backends are supported: the Google Custom Search JSON API (needs an
//! API key and a search engine id) and the keyless DuckDuckGo Instant Answer
//! API. Either way the result is a short plain-text context block.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::retry::{retry_with_backoff, RetryPolicy};
use super::{build_http_client, read_json, ApiError};
use crate::config::WebSearchConfig;

const GOOGLE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";

const NO_RESULTS_SUMMARY: &str = "I searched the web but couldn't find any relevant information.";

/// Result of one web search.
#[derive(Debug, Clone, PartialEq)]
pub enum WebSearchOutcome {
    Context { context: String, source: String },
    NoResults,
    Failed(String),
}

impl WebSearchOutcome {
    /// Render as the tool payload handed to the model.
    pub fn into_payload(self) -> Value {
        match self {
            WebSearchOutcome::Context { context, source } => {
                json!({ "context": context, "source": source })
            }
            WebSearchOutcome::NoResults => json!({ "summary": NO_RESULTS_SUMMARY }),
            WebSearchOutcome::Failed(message) => json!({ "error": message }),
        }
    }

    fn from_snippets(snippets: Vec<String>, source: &str) -> Self {
        if snippets.is_empty() {
            WebSearchOutcome::NoResults
        } else {
            WebSearchOutcome::Context {
                context: snippets.join("\n"),
                source: source.to_string(),
            }
        }
    }
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> WebSearchOutcome;
}

/// Pick the backend named in config. Google falls back to DuckDuckGo when
/// its credentials are missing.
pub fn build_web_search(config: &WebSearchConfig) -> Result<Arc<dyn WebSearch>> {
    match config.provider.as_str() {
        "google_cse" | "google" => match config.google_credentials() {
            Some((api_key, cse_id)) => Ok(Arc::new(GoogleSearch::new(config, api_key, cse_id)?)),
            None => {
                warn!("Google search credentials missing, falling back to DuckDuckGo");
                Ok(Arc::new(DuckDuckGoSearch::new(config)?))
            }
        },
        "duckduckgo" => Ok(Arc::new(DuckDuckGoSearch::new(config)?)),
        other => anyhow::bail!("Unknown web search provider: {}", other),
    }
}

// --- Google Custom Search ---

pub struct GoogleSearch {
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
    max_results: usize,
    retry: RetryPolicy,
}

impl GoogleSearch {
    pub fn new(config: &WebSearchConfig, api_key: String, cse_id: String) -> Result<Self> {
        Ok(Self {
            client: build_http_client(&config.http)?,
            api_key,
            cse_id,
            max_results: config.max_results.clamp(1, 10),
            retry: RetryPolicy::from_http(&config.http),
        })
    }
}

#[async_trait]
impl WebSearch for GoogleSearch {
    async fn search(&self, query: &str) -> WebSearchOutcome {
        info!(query, "performing Google web search");
        let num = self.max_results.to_string();
        let result = retry_with_backoff(&self.retry, "google_search", || {
            let request = self.client.get(GOOGLE_ENDPOINT).query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ]);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| ApiError::from_reqwest(GOOGLE_ENDPOINT, e))?;
                read_json(response, GOOGLE_ENDPOINT).await
            }
        })
        .await;

        match result {
            Ok(body) => WebSearchOutcome::from_snippets(
                google_snippets(&body, self.max_results),
                "Google Custom Search",
            ),
            Err(e) => WebSearchOutcome::Failed(format!("Web search failed: {}", e.user_message())),
        }
    }
}

/// `items[].{title, snippet, link}` as one line each.
pub fn google_snippets(body: &Value, max: usize) -> Vec<String> {
    body.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let snippet = item.get("snippet").and_then(Value::as_str)?.trim();
                    if snippet.is_empty() {
                        return None;
                    }
                    let title = item.get("title").and_then(Value::as_str).unwrap_or("");
                    let link = item.get("link").and_then(Value::as_str).unwrap_or("");
                    Some(format!("- {}: {} ({})", title, snippet.replace('\n', " "), link))
                })
                .take(max)
                .collect()
        })
        .unwrap_or_default()
}

// --- DuckDuckGo Instant Answer ---

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    max_results: usize,
    retry: RetryPolicy,
}

impl DuckDuckGoSearch {
    pub fn new(config: &WebSearchConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(&config.http)?,
            max_results: config.max_results.max(1),
            retry: RetryPolicy::from_http(&config.http),
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> WebSearchOutcome {
        info!(query, "performing DuckDuckGo web search");
        let result = retry_with_backoff(&self.retry, "duckduckgo_search", || {
            let request = self.client.get(DUCKDUCKGO_ENDPOINT).query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ]);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| ApiError::from_reqwest(DUCKDUCKGO_ENDPOINT, e))?;
                read_json(response, DUCKDUCKGO_ENDPOINT).await
            }
        })
        .await;

        match result {
            Ok(body) => WebSearchOutcome::from_snippets(
                duckduckgo_snippets(&body, self.max_results),
                "DuckDuckGo",
            ),
            Err(e) => WebSearchOutcome::Failed(format!("Web search failed: {}", e.user_message())),
        }
    }
}

/// The abstract (if any) followed by related topic texts. Topic groups nest
/// their entries under `Topics`.
pub fn duckduckgo_snippets(body: &Value, max: usize) -> Vec<String> {
    let mut snippets = Vec::new();

    if let Some(text) = body.get("AbstractText").and_then(Value::as_str) {
        let text = text.trim();
        if !text.is_empty() {
            match body.get("AbstractSource").and_then(Value::as_str) {
                Some(src) if !src.is_empty() => snippets.push(format!("- {} ({})", text, src)),
                _ => snippets.push(format!("- {}", text)),
            }
        }
    }
    if let Some(answer) = body.get("Answer").and_then(Value::as_str) {
        if !answer.trim().is_empty() {
            snippets.push(format!("- {}", answer.trim()));
        }
    }

    let mut topics: Vec<&Value> = Vec::new();
    if let Some(related) = body.get("RelatedTopics").and_then(Value::as_array) {
        for topic in related {
            match topic.get("Topics").and_then(Value::as_array) {
                Some(group) => topics.extend(group.iter()),
                None => topics.push(topic),
            }
        }
    }
    for topic in topics {
        if let Some(text) = topic.get("Text").and_then(Value::as_str) {
            if !text.trim().is_empty() {
                snippets.push(format!("- {}", text.trim()));
            }
        }
    }

    snippets.truncate(max);
    snippets
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_payloads() {
        let ctx = WebSearchOutcome::Context {
            context: "- a".into(),
            source: "DuckDuckGo".into(),
        };
        assert_eq!(ctx.into_payload(), json!({"context": "- a", "source": "DuckDuckGo"}));
        assert_eq!(
            WebSearchOutcome::NoResults.into_payload()["summary"],
            NO_RESULTS_SUMMARY
        );
        assert_eq!(
            WebSearchOutcome::Failed("boom".into()).into_payload(),
            json!({"error": "boom"})
        );
    }

    #[test]
    fn test_google_snippets() {
        let body = json!({
            "items": [
                {"title": "Wimbledon", "snippet": "Final\nresult", "link": "https://a.test"},
                {"title": "Empty", "snippet": "  ", "link": "https://b.test"},
                {"title": "ATP", "snippet": "Rankings", "link": "https://c.test"},
            ]
        });
        let snippets = google_snippets(&body, 5);
        assert_eq!(
            snippets,
            vec![
                "- Wimbledon: Final result (https://a.test)",
                "- ATP: Rankings (https://c.test)",
            ]
        );
        assert!(google_snippets(&json!({}), 5).is_empty());
    }

    #[test]
    fn test_duckduckgo_snippets_flatten_topic_groups() {
        let body = json!({
            "AbstractText": "Tennis is a racket sport.",
            "AbstractSource": "Wikipedia",
            "RelatedTopics": [
                {"Text": "Grand Slam - the four majors"},
                {"Name": "Players", "Topics": [
                    {"Text": "Roger Federer"},
                    {"Text": "Rafael Nadal"}
                ]}
            ]
        });
        let snippets = duckduckgo_snippets(&body, 3);
        assert_eq!(
            snippets,
            vec![
                "- Tennis is a racket sport. (Wikipedia)",
                "- Grand Slam - the four majors",
                "- Roger Federer",
            ]
        );
    }

    #[test]
    fn test_empty_results_become_no_results() {
        let outcome = WebSearchOutcome::from_snippets(duckduckgo_snippets(&json!({}), 5), "x");
        assert_eq!(outcome, WebSearchOutcome::NoResults);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = WebSearchConfig {
            provider: "altavista".into(),
            ..WebSearchConfig::default()
        };
        assert!(build_web_search(&config).is_err());
    }
}
