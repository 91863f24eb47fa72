use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::{Provider, ProviderConfig};
use crate::types::{ChatMessage, ChatResponse, ToolDef};

use super::convert::{messages_to_wire, response_from_wire, tool_to_wire};
use super::types::{AnthropicRequest, AnthropicResponse};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// HTTP client for the Anthropic Messages API.
pub struct AnthropicProvider {
    name: String,
    config: ProviderConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_request(&self, messages: &[ChatMessage], tools: &[ToolDef]) -> AnthropicRequest {
        let (system, wire_messages) = messages_to_wire(messages);
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: self.config.temperature,
            messages: wire_messages,
            system,
            tools: tools.iter().map(tool_to_wire).collect(),
        }
    }

    async fn request(&self, request: AnthropicRequest) -> Result<ChatResponse> {
        let url = format!(
            "{}/v1/messages",
            self.config.base_url.trim_end_matches('/')
        );
        debug!(provider = %self.name, model = %request.model, "messages request");

        let res = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
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

        let parsed: AnthropicResponse = serde_json::from_str(&text)?;
        Ok(response_from_wire(parsed))
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(
            "anthropic",
            ProviderConfig::new("https://api.anthropic.com/", "sk-ant-test")
                .with_kind(ProviderKind::Anthropic)
                .with_model("claude-haiku-4-5")
                .with_temperature(0.6),
        )
    }

    #[test]
    fn test_name() {
        assert_eq!(provider().name(), "anthropic");
    }

    #[test]
    fn test_build_request() {
        let messages = vec![
            ChatMessage::system("you are a scout"),
            ChatMessage::user("report in"),
        ];
        let tools = vec![ToolDef::new("scan", "Scan", serde_json::json!({}))];
        let request = provider().build_request(&messages, &tools);

        assert_eq!(request.model, "claude-haiku-4-5");
        assert_eq!(request.temperature, 0.6);
        assert_eq!(request.system.as_deref(), Some("you are a scout"));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.tools.len(), 1);
    }
}
