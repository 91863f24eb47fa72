//! The proxy trait the turn engine calls through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::McpError;
use crate::protocol::{ToolCallOutcome, ToolInfo};

/// Identity of the mysis making a tool call, forwarded to the proxy so game
/// actions are attributed correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub mysis_id: String,
    pub mysis_name: String,
}

impl Caller {
    pub fn new(mysis_id: impl Into<String>, mysis_name: impl Into<String>) -> Self {
        Self {
            mysis_id: mysis_id.into(),
            mysis_name: mysis_name.into(),
        }
    }
}

/// Access to the external tool surface. Swappable on a mysis at any time;
/// each turn snapshots the handle at start.
#[async_trait]
pub trait McpProxy: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError>;

    /// Invoke a tool. `arguments` is raw JSON text from the model, passed
    /// through unchanged.
    async fn call_tool(
        &self,
        caller: &Caller,
        name: &str,
        arguments: &str,
    ) -> Result<ToolCallOutcome, McpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_serialization() {
        let caller = Caller::new("m1", "scout");
        let json = serde_json::to_string(&caller).unwrap();
        assert!(json.contains("\"mysis_id\":\"m1\""));
        assert!(json.contains("\"mysis_name\":\"scout\""));
    }
}
