//! Chat-completion client used for story text (and illustration prompts).
//!
//! Requests and responses use the `async-openai` chat types; transport is a
//! plain `reqwest` client so the base URL can point at any OpenAI-compatible
//! service.

use crate::config::ProviderConfig;
use crate::providers::{ProviderError, endpoint_url, from_reqwest};
use async_openai::types::chat::{CreateChatCompletionRequest, CreateChatCompletionResponse};
use std::time::Duration;

/// Chat-completion service seam.
#[async_trait::async_trait]
pub trait ChatCompletions: Send + Sync {
    async fn create(&self, request: CreateChatCompletionRequest) -> Result<CreateChatCompletionResponse, ProviderError>;
}

/// Live client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl OpenAiChat {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: endpoint_url(&config.chat_base_url, "chat/completions"),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl ChatCompletions for OpenAiChat {
    async fn create(&self, request: CreateChatCompletionRequest) -> Result<CreateChatCompletionResponse, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse {
            message: format!("failed to parse chat completion response: {e}"),
        })
    }
}

/// Extract the assistant text from the first choice, if any.
pub fn completion_text(response: &CreateChatCompletionResponse) -> Option<String> {
    response.choices.first().and_then(|choice| choice.message.content.clone())
}
