//! Provider trait, per-provider configuration, and the registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::providers::{AnthropicProvider, OpenAiProvider};
use crate::types::{ChatMessage, ChatResponse, ToolDef};

/// A chat-completions backend. One instance per mysis; swapped under the
/// mysis lock and closed when the mysis stops.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Plain text completion.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Completion with tool definitions; the response may carry tool calls.
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<ChatResponse>;

    /// Release any held resources. Default is a no-op.
    async fn close(&self) {}
}

/// Which wire protocol a provider entry speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// Chat Completions (api.openai.com and compatible gateways).
    #[default]
    OpenAiCompatible,
    /// Anthropic Messages API.
    Anthropic,
}

/// Connection settings for one named provider entry.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            temperature: 1.0,
        }
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Read `<PREFIX>_API_KEY`, `<PREFIX>_BASE_URL` and `<PREFIX>_MODEL`.
    /// The ANTHROPIC prefix selects the Messages API with its own endpoint
    /// and model defaults.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let api_key = std::env::var(format!("{prefix}_API_KEY"))
            .map_err(|_| Error::MissingApiKey(prefix.to_lowercase()))?;

        let anthropic = prefix.eq_ignore_ascii_case("anthropic");
        let default_base = if anthropic {
            "https://api.anthropic.com"
        } else {
            "https://api.openai.com"
        };
        let base_url =
            std::env::var(format!("{prefix}_BASE_URL")).unwrap_or_else(|_| default_base.to_string());

        let mut config = Self::new(base_url, api_key);
        if anthropic {
            config.kind = ProviderKind::Anthropic;
            config.model = "claude-haiku-4-5".to_string();
        }
        if let Ok(model) = std::env::var(format!("{prefix}_MODEL")) {
            config.model = model;
        }
        Ok(config)
    }
}

/// Registry of provider configurations, keyed by provider name. The
/// Commander validates names against it and instantiates per-mysis clients.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    configs: HashMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider config under the given name. Returns `self` for
    /// chaining.
    pub fn register(mut self, name: impl Into<String>, config: ProviderConfig) -> Self {
        self.configs.insert(name.into(), config);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Result<&ProviderConfig> {
        self.configs
            .get(name)
            .ok_or_else(|| Error::ProviderNotFound(name.to_string()))
    }

    /// Instantiate a provider client for the named entry.
    pub fn create(&self, name: &str) -> Result<Arc<dyn Provider>> {
        let config = self.get(name)?.clone();
        Ok(instantiate(name, config))
    }

    /// Instantiate with a model/temperature override (per-mysis config).
    pub fn create_with(
        &self,
        name: &str,
        model: &str,
        temperature: f64,
    ) -> Result<Arc<dyn Provider>> {
        let mut config = self.get(name)?.clone();
        if !model.is_empty() {
            config.model = model.to_string();
        }
        config.temperature = temperature;
        Ok(instantiate(name, config))
    }
}

fn instantiate(name: &str, config: ProviderConfig) -> Arc<dyn Provider> {
    match config.kind {
        ProviderKind::OpenAiCompatible => Arc::new(OpenAiProvider::new(name, config)),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(name, config)),
    }
}
