//! Runtime error types.

use thiserror::Error;
use zoea_core::MysisState;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown mysis: {0}")]
    MysisNotFound(String),

    #[error("provider not configured: {0}")]
    ProviderNotFound(String),

    #[error("fleet at capacity ({max} myses)")]
    AtCapacity { max: usize },

    #[error("mysis is {state}; {hint}")]
    InvalidState { state: MysisState, hint: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error(transparent)]
    Mcp(#[from] zoea_mcp::McpError),

    #[error(transparent)]
    Store(#[from] zoea_core::CoreError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out: {0}")]
    Timeout(String),
}

impl RuntimeError {
    pub fn invalid_state(state: MysisState, hint: impl Into<String>) -> Self {
        RuntimeError::InvalidState {
            state,
            hint: hint.into(),
        }
    }
}

/// How a turn ended when it did not complete normally.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The mysis context was cancelled mid-turn. Not an error when the mysis
    /// is stopping.
    #[error("turn cancelled")]
    Cancelled,

    /// Provider, persistence or fatal tool failure; the mysis goes to
    /// `errored`.
    #[error("turn failed: {0}")]
    Fatal(String),
}

impl From<zoea_core::CoreError> for TurnError {
    fn from(e: zoea_core::CoreError) -> Self {
        TurnError::Fatal(format!("store: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
