//! Web search tool.
//!
//! Two backends: Tavily (API key, default) and the DuckDuckGo instant
//! answer API (no key). Results are rendered as markdown blocks the model
//! can quote from.

use async_trait::async_trait;
use homeclaw_config::{Credentials, WebSearchConfig};
use homeclaw_core::error::ToolError;
use homeclaw_core::tool::{Tool, ToolResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const TAVILY_URL: &str = "https://api.tavily.com/search";
const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String>;
}

// --- Tavily ---

pub struct TavilyBackend {
    client: Client,
    /// `None` when the key is absent; searches then fail with guidance
    api_key: Option<String>,
    api_key_env: String,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

pub(crate) fn parse_tavily(body: &str) -> Result<Vec<SearchHit>, String> {
    let parsed: TavilyResponse =
        serde_json::from_str(body).map_err(|e| format!("Unexpected Tavily response: {e}"))?;
    Ok(parsed
        .results
        .into_iter()
        .map(|r| SearchHit {
            title: r.title,
            url: r.url,
            content: r.content,
        })
        .collect())
}

#[async_trait]
impl SearchBackend for TavilyBackend {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(format!(
                "Tavily API key not set. Add {} to the credential file or switch tools.web_search.provider to \"duckduckgo\".",
                self.api_key_env
            ));
        };

        let body = serde_json::json!({
            "api_key": key,
            "query": query,
            "max_results": max_results,
        });

        let response = self
            .client
            .post(TAVILY_URL)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Tavily request failed: {e}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read Tavily response: {e}"))?;
        if !status.is_success() {
            return Err(format!("Tavily returned HTTP {}", status.as_u16()));
        }
        parse_tavily(&text)
    }
}

// --- DuckDuckGo ---

pub struct DuckDuckGoBackend {
    client: Client,
}

/// Flatten an instant-answer payload into hits: the abstract first, then
/// related topics (including topics nested under category groups).
pub(crate) fn parse_duckduckgo(body: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
    let data: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("Unexpected DuckDuckGo response: {e}"))?;

    let mut hits = Vec::new();
    let abstract_text = data["AbstractText"].as_str().unwrap_or_default();
    if !abstract_text.is_empty() {
        hits.push(SearchHit {
            title: data["Heading"].as_str().unwrap_or("Summary").to_string(),
            url: data["AbstractURL"].as_str().unwrap_or_default().to_string(),
            content: abstract_text.to_string(),
        });
    }

    fn collect(topics: &[serde_json::Value], hits: &mut Vec<SearchHit>, max: usize) {
        for topic in topics {
            if hits.len() >= max {
                return;
            }
            if let Some(nested) = topic["Topics"].as_array() {
                collect(nested, hits, max);
                continue;
            }
            let text = topic["Text"].as_str().unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            let title = text.split(" - ").next().unwrap_or(text).to_string();
            hits.push(SearchHit {
                title,
                url: topic["FirstURL"].as_str().unwrap_or_default().to_string(),
                content: text.to_string(),
            });
        }
    }

    if let Some(related) = data["RelatedTopics"].as_array() {
        collect(related, &mut hits, max_results);
    }
    hits.truncate(max_results);
    Ok(hits)
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        let response = self
            .client
            .get(DUCKDUCKGO_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| format!("DuckDuckGo request failed: {e}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read DuckDuckGo response: {e}"))?;
        if !status.is_success() {
            return Err(format!("DuckDuckGo returned HTTP {}", status.as_u16()));
        }
        parse_duckduckgo(&text, max_results)
    }
}

/// Render hits as `**title**\nurl\ncontent` blocks separated by rules.
pub fn format_results(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".into();
    }
    hits.iter()
        .map(|h| format!("**{}**\n{}\n{}", h.title, h.url, h.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

// --- Tool ---

pub struct WebSearchTool {
    backend: Box<dyn SearchBackend>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(backend: Box<dyn SearchBackend>, max_results: usize) -> Self {
        Self {
            backend,
            max_results: max_results.max(1),
        }
    }

    /// Pick the backend named in the configuration. A missing Tavily key is
    /// not an error here; the tool reports it when the model calls it.
    pub fn from_config(config: &WebSearchConfig, credentials: &Credentials) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("HTTP client: {e}"),
            })?;

        let backend: Box<dyn SearchBackend> = match config.provider.to_lowercase().as_str() {
            "tavily" => {
                let api_key = credentials.get(&config.api_key_env);
                if api_key.is_none() {
                    warn!(env_var = %config.api_key_env, "Tavily key not set; web_search will report an error when used");
                }
                Box::new(TavilyBackend {
                    client,
                    api_key,
                    api_key_env: config.api_key_env.clone(),
                })
            }
            "duckduckgo" | "ddg" => Box::new(DuckDuckGoBackend { client }),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown web search provider '{other}' (expected \"tavily\" or \"duckduckgo\")"
                )));
            }
        };

        Ok(Self::new(backend, config.max_results as usize))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns titles, URLs and content snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = crate::required_str(&arguments, "query")?;
        debug!(backend = self.backend.name(), query = %query, "Web search");

        match self.backend.search(query, self.max_results).await {
            Ok(hits) => Ok(ToolResult::ok(format_results(&hits))),
            Err(reason) => {
                warn!(backend = self.backend.name(), error = %reason, "Web search failed");
                Ok(ToolResult::failed(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend(Vec<SearchHit>);

    #[async_trait]
    impl SearchBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
            Ok(self.0.iter().take(max_results).cloned().collect())
        }
    }

    fn hit(n: u32) -> SearchHit {
        SearchHit {
            title: format!("Result {n}"),
            url: format!("https://example.com/{n}"),
            content: format!("Snippet {n}"),
        }
    }

    #[test]
    fn formats_blocks_with_separator() {
        let out = format_results(&[hit(1), hit(2)]);
        assert_eq!(
            out,
            "**Result 1**\nhttps://example.com/1\nSnippet 1\n\n---\n\n**Result 2**\nhttps://example.com/2\nSnippet 2"
        );
        assert_eq!(format_results(&[]), "No results found.");
    }

    #[test]
    fn parses_tavily_results() {
        let body = r#"{"query":"rust","results":[{"title":"Rust","url":"https://rust-lang.org","content":"A language","score":0.9}]}"#;
        let hits = parse_tavily(body).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://rust-lang.org");
    }

    #[test]
    fn parses_duckduckgo_abstract_and_nested_topics() {
        let body = r#"{
            "Heading": "Rust",
            "AbstractText": "Rust is a systems language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "RelatedTopics": [
                {"Text": "Cargo - the Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                {"Name": "Games", "Topics": [
                    {"Text": "Rust (video game) - survival game", "FirstURL": "https://duckduckgo.com/Rust_game"}
                ]}
            ]
        }"#;
        let hits = parse_duckduckgo(body, 5).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Rust");
        assert_eq!(hits[1].title, "Cargo");
        assert_eq!(hits[2].url, "https://duckduckgo.com/Rust_game");

        let capped = parse_duckduckgo(body, 2).unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn tool_respects_max_results() {
        let tool = WebSearchTool::new(Box::new(FixedBackend(vec![hit(1), hit(2), hit(3)])), 2);
        let result = tool
            .execute(serde_json::json!({"query": "anything"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("Result 2"));
        assert!(!result.output.contains("Result 3"));
    }

    #[tokio::test]
    async fn missing_tavily_key_fails_at_call_time() {
        let config = WebSearchConfig {
            api_key_env: "HOMECLAW_TEST_UNSET_TAVILY_KEY".into(),
            ..WebSearchConfig::default()
        };
        let tool = WebSearchTool::from_config(&config, &Credentials::default()).unwrap();
        let result = tool
            .execute(serde_json::json!({"query": "weather"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("HOMECLAW_TEST_UNSET_TAVILY_KEY"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = WebSearchConfig {
            provider: "bing".into(),
            ..WebSearchConfig::default()
        };
        assert!(WebSearchTool::from_config(&config, &Credentials::default()).is_err());
    }
}
