//! The turn engine: one LLM round including any tool calls it makes.
//!
//! A turn runs under its mysis's turn lock with a snapshot of the provider
//! and MCP handles taken at start. Provider and persistence failures are
//! turn-fatal; tool timeouts and exhausted retry budgets are turn-fatal;
//! other tool failures become error-text results the model can react to.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zoea_observability::{record_duration, record_error};

use zoea_core::{
    format_tool_calls, format_tool_result, Memory, MemoryRole, MemorySource, MysisId, Store,
    SwarmEvent, ToolCall,
};
use zoea_llms::{ChatMessage, Provider, ToolDef};
use zoea_mcp::{Caller, McpProxy};

use crate::activity::ActivityTracker;
use crate::config::SwarmConfig;
use crate::context::compose;
use crate::error::TurnError;
use crate::event_bus::EventBus;

/// Persisted when the model returns neither content nor reasoning.
const EMPTY_RESPONSE_FALLBACK: &str = "Nothing to report this turn.";

/// A message handed to the engine to open the turn. Absent for autonomous
/// triggers (the composer decides what to prompt with).
#[derive(Debug, Clone)]
pub(crate) struct IncomingMessage {
    pub content: String,
    pub source: MemorySource,
    pub sender_id: String,
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnOutcome {
    /// The model produced a final response.
    Completed { added_synthetic: bool },
    /// The tool-iteration cap was hit; the next turn continues gracefully.
    IterationCapped { added_synthetic: bool },
    /// Nothing to prompt with; no provider call was made.
    Skipped,
}

impl TurnOutcome {
    pub fn added_synthetic(&self) -> bool {
        matches!(
            self,
            TurnOutcome::Completed {
                added_synthetic: true
            } | TurnOutcome::IterationCapped {
                added_synthetic: true
            }
        )
    }
}

/// Everything one turn needs, snapshotted under the mysis lock at start.
pub(crate) struct TurnEngine {
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub provider: Arc<dyn Provider>,
    pub mcp: Option<Arc<dyn McpProxy>>,
    pub activity: Arc<Mutex<ActivityTracker>>,
    pub caller: Caller,
    pub cancel: CancellationToken,
    pub config: SwarmConfig,
}

impl TurnEngine {
    fn mysis_id(&self) -> MysisId {
        MysisId::from(self.caller.mysis_id.as_str())
    }

    fn emit(&self, event: SwarmEvent) {
        self.bus
            .publish(event.for_mysis(&self.caller.mysis_id, &self.caller.mysis_name));
    }

    async fn emit_error(&self, text: impl Into<String>) {
        self.bus
            .publish_blocking(
                SwarmEvent::error(text).for_mysis(&self.caller.mysis_id, &self.caller.mysis_name),
                self.config.publish_timeout,
            )
            .await;
    }

    /// Race a future against the mysis cancellation token.
    async fn race<T>(&self, fut: impl std::future::Future<Output = T>) -> Result<T, TurnError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TurnError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Run one turn. Caller holds the turn lock.
    pub async fn run(
        &self,
        incoming: Option<IncomingMessage>,
        allow_synthetic: bool,
    ) -> Result<TurnOutcome, TurnError> {
        let id = self.mysis_id();
        let started = Instant::now();

        if let Some(message) = incoming {
            let memory = Memory::user(id.clone(), message.source, message.content.clone())
                .with_sender(message.sender_id);
            self.store.add_memory(&memory)?;
            self.emit(SwarmEvent::message(MemoryRole::User, message.content));
        }

        let system = self.store.get_system_memory(&id)?;
        let recent = self
            .store
            .get_recent_memories(&id, self.config.max_context_messages)?;
        let composed = compose(
            system.as_ref(),
            &recent,
            || self.store.get_most_recent_broadcast(&id).ok().flatten(),
            allow_synthetic,
            &self.config.encouragement,
        );
        if !composed.has_prompt {
            return Ok(TurnOutcome::Skipped);
        }
        let added_synthetic = composed.added_synthetic;
        let mut messages = composed.messages;

        let tools = self.list_tools().await?;

        for iteration in 0..self.config.max_tool_iterations {
            let response = self.call_provider(&messages, &tools).await?;

            if !response.has_tool_calls() {
                let mut content = response.content;
                if content.is_empty() && response.reasoning.is_empty() {
                    content = EMPTY_RESPONSE_FALLBACK.to_string();
                }
                let memory = Memory::assistant(id.clone(), content.clone())
                    .with_reasoning(response.reasoning);
                self.store.add_memory(&memory)?;

                self.emit(SwarmEvent::network_idle());
                self.emit(SwarmEvent::response(content));
                record_duration("turn.duration_ms", started.elapsed());
                info!(mysis = %self.caller.mysis_name, iteration, "turn completed");
                return Ok(TurnOutcome::Completed { added_synthetic });
            }

            // The call record lands in the log before any of its results.
            let core_calls: Vec<ToolCall> = response
                .tool_calls
                .iter()
                .map(|c| ToolCall::new(&c.id, &c.name, &c.arguments))
                .collect();
            let call_memory = Memory::assistant(id.clone(), format_tool_calls(&core_calls))
                .with_reasoning(response.reasoning.clone());
            self.store.add_memory(&call_memory)?;
            messages.push(ChatMessage::assistant_tool_calls(
                "",
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let text = self.execute_tool(call).await?;

                self.activity
                    .lock()
                    .expect("activity lock poisoned")
                    .observe_tool_result(&text);

                let result_memory =
                    Memory::tool(id.clone(), format_tool_result(&call.id, &text));
                self.store.add_memory(&result_memory)?;
                self.emit(SwarmEvent::message(MemoryRole::Tool, text.clone()));
                messages.push(ChatMessage::tool(call.id.clone(), text));
            }
        }

        info!(
            mysis = %self.caller.mysis_name,
            cap = self.config.max_tool_iterations,
            "tool iteration cap reached, ending turn"
        );
        Ok(TurnOutcome::IterationCapped { added_synthetic })
    }

    /// Tool listing failures are not fatal: the turn proceeds text-only.
    async fn list_tools(&self) -> Result<Vec<ToolDef>, TurnError> {
        let Some(proxy) = &self.mcp else {
            self.emit_error("no MCP proxy configured; tools unavailable this turn")
                .await;
            return Ok(Vec::new());
        };

        match self.race(proxy.list_tools()).await? {
            Ok(infos) => Ok(infos
                .into_iter()
                .map(|t| ToolDef::new(t.name, t.description, t.input_schema))
                .collect()),
            Err(e) => {
                warn!(mysis = %self.caller.mysis_name, error = %e, "tool listing failed");
                self.emit_error(format!("tool listing failed: {e}")).await;
                Ok(Vec::new())
            }
        }
    }

    async fn call_provider(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<zoea_llms::ChatResponse, TurnError> {
        self.emit(SwarmEvent::network_llm());
        self.activity
            .lock()
            .expect("activity lock poisoned")
            .begin_llm_call();

        let result = self
            .race(self.provider.chat_with_tools(messages, tools))
            .await;

        self.activity
            .lock()
            .expect("activity lock poisoned")
            .end_call();

        match result? {
            Ok(response) => Ok(response),
            Err(e) => {
                record_error(&e);
                if let zoea_llms::Error::RateLimited { provider, model } = &e {
                    self.emit(SwarmEvent::rate_limit(provider, model));
                }
                self.emit(SwarmEvent::network_idle());
                Err(TurnError::Fatal(format!("provider: {e}")))
            }
        }
    }

    /// Execute one tool call. Timeouts and exhausted retries end the turn;
    /// everything else becomes result text.
    async fn execute_tool(&self, call: &zoea_llms::ToolCall) -> Result<String, TurnError> {
        let Some(proxy) = &self.mcp else {
            return Ok(format!("tool {} unavailable: no MCP proxy configured", call.name));
        };

        self.emit(SwarmEvent::network_mcp());
        self.activity
            .lock()
            .expect("activity lock poisoned")
            .begin_mcp_call();

        let result = self
            .race(proxy.call_tool(&self.caller, &call.name, &call.arguments))
            .await;

        self.activity
            .lock()
            .expect("activity lock poisoned")
            .end_call();

        match result? {
            Ok(outcome) => Ok(outcome.text()),
            Err(e) if e.is_fatal() => {
                self.emit_error(format!("tool {}: {e}", call.name)).await;
                Err(TurnError::Fatal(format!("tool {}: {e}", call.name)))
            }
            Err(e) => {
                warn!(mysis = %self.caller.mysis_name, tool = %call.name, error = %e, "tool call failed");
                Ok(format!("tool error: {e}"))
            }
        }
    }
}
