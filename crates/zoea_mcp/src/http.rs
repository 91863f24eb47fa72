//! HTTP proxy client: JSON-RPC over POST with timeout and retry budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::McpError;
use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, ToolCallOutcome, ToolInfo, ToolsListResult,
};
use crate::proxy::{Caller, McpProxy};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Proxy client speaking JSON-RPC to an MCP gateway over HTTP.
pub struct HttpMcpProxy {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
    max_attempts: u32,
    next_id: AtomicU64,
}

impl HttpMcpProxy {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    async fn post_once(&self, request: &JsonRpcRequest) -> Result<serde_json::Value, McpError> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(McpError::Transport(format!("http {status}: {text}")));
        }

        let response: JsonRpcResponse =
            serde_json::from_str(&text).map_err(|e| McpError::Protocol(e.to_string()))?;
        response
            .into_result()
            .map_err(|e| McpError::Tool(e.to_string()))
    }

    /// POST with the per-call deadline and retry budget. The deadline covers
    /// all attempts; transport failures are retried, tool errors are not.
    async fn post(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, Some(params));

        let attempts = async {
            let mut attempt = 1u32;
            loop {
                match self.post_once(&request).await {
                    Ok(value) => return Ok(value),
                    Err(McpError::Transport(message)) if attempt < self.max_attempts => {
                        warn!(method, attempt, %message, "mcp call failed, retrying");
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                        attempt += 1;
                    }
                    Err(McpError::Transport(message)) => {
                        warn!(method, attempts = attempt, %message, "mcp retry budget exhausted");
                        return Err(McpError::RetriesExhausted { attempts: attempt });
                    }
                    Err(other) => return Err(other),
                }
            }
        };

        match tokio::time::timeout(self.timeout, attempts).await {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout),
        }
    }
}

#[async_trait]
impl McpProxy for HttpMcpProxy {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        let value = self.post("tools/list", serde_json::json!({})).await?;
        let result: ToolsListResult =
            serde_json::from_value(value).map_err(|e| McpError::Protocol(e.to_string()))?;
        debug!(count = result.tools.len(), "listed mcp tools");
        Ok(result.tools)
    }

    async fn call_tool(
        &self,
        caller: &Caller,
        name: &str,
        arguments: &str,
    ) -> Result<ToolCallOutcome, McpError> {
        // Arguments come in as raw JSON text; malformed text becomes an
        // empty object rather than a protocol failure.
        let arguments: serde_json::Value =
            serde_json::from_str(arguments).unwrap_or_else(|_| serde_json::json!({}));

        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
            "_meta": { "caller": caller },
        });

        let value = self.post("tools/call", params).await?;
        serde_json::from_value(value).map_err(|e| McpError::Protocol(e.to_string()))
    }
}
