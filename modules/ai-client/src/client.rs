//! Minimal Anthropic messages client for the two calls the pipeline
//! makes: schema-forced story extraction and plain text completion for
//! the digest summary. Requests are built as JSON bodies directly;
//! responses are read through a narrow view of the content blocks.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::schema::StructuredOutput;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Tool name the extraction path forces the model to answer through.
const EXTRACT_TOOL: &str = "submit_extraction";

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: MESSAGES_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Schema-forced extraction: the model must answer through a single
    /// tool whose input schema is derived from `T`, and the tool input
    /// deserializes directly into `T`. Temperature is pinned to 0 so
    /// identical input extracts identically.
    pub async fn extract<T: StructuredOutput>(&self, system: &str, user: &str) -> Result<T> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": 0.0,
            "system": system,
            "messages": [{"role": "user", "content": user}],
            "tools": [{
                "name": EXTRACT_TOOL,
                "description": "Record the structured extraction result.",
                "input_schema": T::output_schema(),
            }],
            "tool_choice": {"type": "tool", "name": EXTRACT_TOOL},
        });

        let response = self.send(&body).await?;
        let input = response
            .content
            .into_iter()
            .find_map(|block| block.input)
            .ok_or_else(|| anyhow!("No structured output in model response"))?;

        serde_json::from_value(input).context("Failed to deserialize structured output")
    }

    /// Plain completion: system + one user message, first text block back.
    pub async fn chat_completion(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": 0.0,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let response = self.send(&body).await?;
        response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| anyhow!("No text in model response"))
    }

    async fn send(&self, body: &serde_json::Value) -> Result<MessagesResponse> {
        debug!(model = %self.model, "Messages API request");

        let resp = self
            .http
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .context("Messages API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Messages API error ({status}): {text}"));
        }

        resp.json().await.context("Failed to parse messages response")
    }
}

/// The slice of a messages response the pipeline reads: text blocks
/// carry `text`, tool_use blocks carry `input`. Everything else in a
/// block is ignored.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_override_applies() {
        let ai = Claude::new("sk-ant-test", "claude-haiku-4-5-20251001")
            .with_base_url("https://custom.api.com/v1/messages");
        assert_eq!(ai.base_url, "https://custom.api.com/v1/messages");
        assert_eq!(ai.model(), "claude-haiku-4-5-20251001");
    }

    #[test]
    fn tool_use_blocks_expose_their_input() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "recording the result"},
                {"type": "tool_use", "id": "tu_1", "name": "submit_extraction",
                 "input": {"stories": []}}
            ],
            "stop_reason": "tool_use"
        }"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        let input = response.content.into_iter().find_map(|b| b.input).unwrap();
        assert_eq!(input, serde_json::json!({"stories": []}));
    }

    #[test]
    fn text_blocks_expose_their_text() {
        let raw = r#"{"content": [{"type": "text", "text": "one tight paragraph"}]}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        let text = response.content.into_iter().find_map(|b| b.text).unwrap();
        assert_eq!(text, "one tight paragraph");
    }
}
