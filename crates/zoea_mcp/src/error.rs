use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    /// The call exceeded its deadline. Turn-fatal.
    #[error("tool call timed out")]
    Timeout,

    /// The retry budget ran out. Turn-fatal.
    #[error("tool call failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server reported a tool-level failure (surfaced as a result, not
    /// an error, by the turn engine).
    #[error("tool error: {0}")]
    Tool(String),
}

impl McpError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, McpError::Timeout)
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, McpError::RetriesExhausted { .. })
    }

    /// Either of the kinds that must end the current turn.
    pub fn is_fatal(&self) -> bool {
        self.is_timeout() || self.is_retries_exhausted()
    }
}
