use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::{Provider, ProviderConfig};
use crate::types::{ChatMessage, ChatResponse, ToolDef};

use super::convert::{message_to_wire, response_from_wire, tool_to_wire};
use super::types::{WireRequest, WireResponse};

/// HTTP client for an OpenAI-compatible Chat Completions endpoint.
pub struct OpenAiProvider {
    name: String,
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn request(&self, request: WireRequest) -> Result<ChatResponse> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        debug!(provider = %self.name, model = %request.model, "chat completion request");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = res.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimited {
                provider: self.name.clone(),
                model: self.config.model.clone(),
            });
        }
        let text = res.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let parsed: WireResponse = serde_json::from_str(&text)?;
        let choice = parsed.choices.into_iter().next().ok_or(Error::EmptyResponse)?;
        Ok(response_from_wire(choice.message))
    }

    fn build_request(&self, messages: &[ChatMessage], tools: &[ToolDef]) -> WireRequest {
        WireRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(message_to_wire).collect(),
            temperature: self.config.temperature,
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.iter().map(tool_to_wire).collect())
            },
            tool_choice: if tools.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.request(self.build_request(messages, &[])).await?;
        Ok(response.content)
    }

    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<ChatResponse> {
        self.request(self.build_request(messages, tools)).await
    }
}
