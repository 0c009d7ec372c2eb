//! Anthropic messages API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ForgeError;
use crate::llm::{provider_error, CompletionModel, CompletionRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl AnthropicClient {
    pub fn new(api_key: Option<String>, model: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

fn joined_text(blocks: Vec<ContentBlock>) -> String {
    blocks
        .into_iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl CompletionModel for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ForgeError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ForgeError::AuthMissing("ANTHROPIC_API_KEY is not set".into()))?;

        let body = MessageRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::LlmFailure(format!("anthropic request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(provider_error("anthropic", response).await);
        }

        let parsed: MessageResponse = response.json().await.map_err(|e| {
            ForgeError::LlmFailure(format!("anthropic response unreadable: {}", e))
        })?;
        let text = joined_text(parsed.content);
        if text.trim().is_empty() {
            return Err(ForgeError::LlmFailure(
                "anthropic returned an empty completion".into(),
            ));
        }
        debug!(chars = text.len(), "anthropic completion received");
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_blocks_are_joined() {
        let raw = r#"{"id":"m","type":"message","role":"assistant","model":"x",
            "content":[{"type":"text","text":"import cadquery"},{"type":"tool_use","id":"t"},{"type":"text","text":" as cq"}]}"#;
        let parsed: MessageResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(joined_text(parsed.content), "import cadquery as cq");
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_missing() {
        let client = AnthropicClient::new(None, "claude".into(), None);
        let err = client
            .complete(CompletionRequest {
                system: Some("role".into()),
                prompt: "hi".into(),
                temperature: 0.1,
                max_tokens: 10,
            })
            .await
            .unwrap_err();
        assert_eq!(err.label(), "AUTH_MISSING");
    }
}
