//! zoea-mcp — MCP tool proxy client for the swarm.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for `tools/list` and `tools/call`.
//! - The `McpProxy` trait the turn engine calls through, with caller
//!   identity forwarded so the proxy can attribute game actions to a mysis.
//! - An HTTP proxy client with a per-call timeout and a bounded retry
//!   budget; timeouts and exhausted budgets are distinguished error kinds
//!   because they end the turn.

pub mod error;
pub mod http;
pub mod protocol;
pub mod proxy;

pub use error::McpError;
pub use http::HttpMcpProxy;
pub use protocol::{ToolCallOutcome, ToolContent, ToolInfo};
pub use proxy::{Caller, McpProxy};
