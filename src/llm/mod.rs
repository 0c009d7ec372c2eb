//! Non-streaming chat completion providers.

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{LlmProvider, LlmSettings};
use crate::error::ForgeError;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Return the text of the model's reply.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ForgeError>;

    fn model_name(&self) -> &str;
}

/// Provider selected by configuration. Keys are checked per call, so a
/// missing key only fails the steps that actually need the model.
pub fn completion_model(settings: &LlmSettings) -> Arc<dyn CompletionModel> {
    match settings.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiClient::new(
            settings.openai_api_key.clone(),
            settings.model.clone(),
            settings.base_url.clone(),
        )),
        LlmProvider::Anthropic => Arc::new(AnthropicClient::new(
            settings.anthropic_api_key.clone(),
            settings.model.clone(),
            settings.base_url.clone(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Turn a failed provider response into an `LlmFailure`.
async fn provider_error(provider: &str, response: reqwest::Response) -> ForgeError {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let message = serde_json::from_str::<ApiError>(&text)
        .map(|e| e.error.message)
        .unwrap_or(text);
    ForgeError::LlmFailure(format!("{} returned {}: {}", provider, status, message.trim()))
}
