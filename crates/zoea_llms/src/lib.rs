//! zoea_llms — provider-agnostic chat completions with tool calling.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  ProviderRegistry                    │
//! │  ┌──────────────────────────────────────────────┐    │
//! │  │  HashMap<String, ProviderConfig>             │    │
//! │  └──────────────────────────────────────────────┘    │
//! │                       │ create(name)                 │
//! │                       ▼                              │
//! │              Arc<dyn Provider>                       │
//! │                       │                              │
//! │               ┌───────┴───────┐                      │
//! │               ▼               ▼                      │
//! │        ┌────────────┐   ┌───────────┐                │
//! │        │ OpenAI-    │   │ Anthropic │                │
//! │        │ compatible │   │ Messages  │                │
//! │        └────────────┘   └───────────┘                │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Each mysis owns its own provider instance, created from the registry at
//! creation/configure time and closed when the mysis stops. Cancellation is
//! the caller's concern: the runtime races chat futures against its
//! cancellation token.

pub mod error;
pub mod provider;
pub mod providers;
pub mod types;

pub use error::{Error, Result};
pub use provider::{Provider, ProviderConfig, ProviderKind, ProviderRegistry};
pub use providers::{AnthropicProvider, OpenAiProvider};
pub use types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDef};
