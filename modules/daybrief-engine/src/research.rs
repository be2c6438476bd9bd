//! Web-research Q&A provider for the web gatherer.

use async_trait::async_trait;
use tracing::info;

use daybrief_common::error::{DaybriefError, Result};

// --- ResearchProvider trait ---

#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Ask the research service a question; returns a synthesized answer
    /// plus the sources it cites.
    async fn research(&self, query: &str) -> Result<ResearchAnswer>;
}

#[derive(Debug, Clone, Default)]
pub struct ResearchAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone)]
pub struct Citation {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Map an HTTP status to the provider error taxonomy: 429 and 5xx are
/// retriable, everything else is fatal for the source.
pub(crate) fn provider_status_error(label: &str, status: u16, body: &str) -> DaybriefError {
    if status == 429 || status >= 500 {
        DaybriefError::ProviderTransient(format!("{label} returned {status}: {body}"))
    } else {
        DaybriefError::ProviderFatal(format!("{label} returned {status}: {body}"))
    }
}

// --- Tavily (hosted research API) ---

const TAVILY_URL: &str = "https://api.tavily.com/search";
const MAX_CITATIONS: usize = 8;

pub struct TavilyResearcher {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl TavilyResearcher {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
            base_url: TAVILY_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl ResearchProvider for TavilyResearcher {
    async fn research(&self, query: &str) -> Result<ResearchAnswer> {
        info!(query, "Research query");

        let body = serde_json::json!({
            "query": query,
            "max_results": MAX_CITATIONS,
            "search_depth": "advanced",
            "include_answer": true,
        });

        let resp = self
            .client
            .post(&self.base_url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DaybriefError::ProviderTransient(format!("research request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(provider_status_error("research", status.as_u16(), &text));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DaybriefError::ProviderFatal(format!("malformed research response: {e}")))?;

        let answer = parse_answer(&data);
        info!(query, citations = answer.citations.len(), "Research complete");
        Ok(answer)
    }
}

pub(crate) fn parse_answer(data: &serde_json::Value) -> ResearchAnswer {
    let answer = data["answer"].as_str().unwrap_or("").to_string();
    let citations = data["results"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    let url = r["url"].as_str()?.to_string();
                    let title = r["title"].as_str().unwrap_or("").to_string();
                    let snippet = r["content"].as_str().unwrap_or("").to_string();
                    Some(Citation { url, title, snippet })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    ResearchAnswer { answer, citations }
}
