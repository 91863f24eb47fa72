//! zoea-core — data model and persistence for the zoea swarm.
//!
//! Defines the mysis identity/state types, the append-only memory log
//! records, pooled accounts, the swarm event types, the tool-call storage
//! codec, and the SQLite store the runtime persists through.

pub mod account;
pub mod error;
pub mod event;
pub mod memory;
pub mod mysis;
pub mod store;
pub mod tool_call;

pub use account::Account;
pub use error::{CoreError, Result};
pub use event::{EventKind, EventPayload, SwarmEvent};
pub use memory::{Memory, MemoryRole, MemorySource};
pub use mysis::{MysisConfig, MysisId, MysisRecord, MysisState};
pub use store::Store;
pub use tool_call::{
    format_tool_calls, format_tool_result, is_tool_call_content, parse_tool_calls,
    parse_tool_result, ToolCall, FIELD_DELIMITER, RECORD_DELIMITER, TOOL_CALL_STORAGE_PREFIX,
};
