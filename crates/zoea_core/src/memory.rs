use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::mysis::MysisId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MemoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRole::System => "system",
            MemoryRole::User => "user",
            MemoryRole::Assistant => "assistant",
            MemoryRole::Tool => "tool",
        }
    }
}

impl FromStr for MemoryRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(MemoryRole::System),
            "user" => Ok(MemoryRole::User),
            "assistant" => Ok(MemoryRole::Assistant),
            "tool" => Ok(MemoryRole::Tool),
            _ => Err(()),
        }
    }
}

/// Where a memory came from. `Broadcast` memories carry the sender in
/// `sender_id` (empty for a commander broadcast).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    System,
    Direct,
    Broadcast,
    Llm,
    Tool,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::System => "system",
            MemorySource::Direct => "direct",
            MemorySource::Broadcast => "broadcast",
            MemorySource::Llm => "llm",
            MemorySource::Tool => "tool",
        }
    }
}

impl FromStr for MemorySource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(MemorySource::System),
            "direct" => Ok(MemorySource::Direct),
            "broadcast" => Ok(MemorySource::Broadcast),
            "llm" => Ok(MemorySource::Llm),
            "tool" => Ok(MemorySource::Tool),
            _ => Err(()),
        }
    }
}

/// One record in a mysis's append-only conversation log. Never mutated after
/// insert; removed only by the owning mysis's cascade delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Monotonically increasing row id (0 until persisted).
    pub id: i64,
    pub mysis_id: MysisId,
    pub role: MemoryRole,
    pub source: MemorySource,
    pub content: String,
    pub reasoning: String,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(
        mysis_id: MysisId,
        role: MemoryRole,
        source: MemorySource,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            mysis_id,
            role,
            source,
            content: content.into(),
            reasoning: String::new(),
            sender_id: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn system(mysis_id: MysisId, content: impl Into<String>) -> Self {
        Self::new(mysis_id, MemoryRole::System, MemorySource::System, content)
    }

    pub fn user(mysis_id: MysisId, source: MemorySource, content: impl Into<String>) -> Self {
        Self::new(mysis_id, MemoryRole::User, source, content)
    }

    pub fn assistant(mysis_id: MysisId, content: impl Into<String>) -> Self {
        Self::new(mysis_id, MemoryRole::Assistant, MemorySource::Llm, content)
    }

    pub fn tool(mysis_id: MysisId, content: impl Into<String>) -> Self {
        Self::new(mysis_id, MemoryRole::Tool, MemorySource::Tool, content)
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    /// True for the user-role memories that open a turn: a direct message, a
    /// broadcast, or a system nudge.
    pub fn is_prompt(&self) -> bool {
        self.role == MemoryRole::User
            && matches!(
                self.source,
                MemorySource::Direct | MemorySource::Broadcast | MemorySource::System
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&MemoryRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_all_roles_roundtrip() {
        let roles = vec![
            MemoryRole::System,
            MemoryRole::User,
            MemoryRole::Assistant,
            MemoryRole::Tool,
        ];
        for role in roles {
            assert_eq!(role.as_str().parse::<MemoryRole>(), Ok(role));
        }
    }

    #[test]
    fn test_all_sources_roundtrip() {
        let sources = vec![
            MemorySource::System,
            MemorySource::Direct,
            MemorySource::Broadcast,
            MemorySource::Llm,
            MemorySource::Tool,
        ];
        for source in sources {
            assert_eq!(source.as_str().parse::<MemorySource>(), Ok(source));
        }
        assert!("bogus".parse::<MemorySource>().is_err());
    }

    #[test]
    fn test_memory_constructors() {
        let id = MysisId::new();
        let m = Memory::user(id.clone(), MemorySource::Direct, "hello");
        assert_eq!(m.role, MemoryRole::User);
        assert_eq!(m.source, MemorySource::Direct);
        assert_eq!(m.content, "hello");
        assert!(m.sender_id.is_empty());

        let m = Memory::assistant(id.clone(), "hi").with_reasoning("thinking");
        assert_eq!(m.source, MemorySource::Llm);
        assert_eq!(m.reasoning, "thinking");

        let m = Memory::user(id, MemorySource::Broadcast, "ping").with_sender("mysis-2");
        assert_eq!(m.sender_id, "mysis-2");
    }

    #[test]
    fn test_is_prompt() {
        let id = MysisId::new();
        assert!(Memory::user(id.clone(), MemorySource::Direct, "x").is_prompt());
        assert!(Memory::user(id.clone(), MemorySource::Broadcast, "x").is_prompt());
        assert!(Memory::user(id.clone(), MemorySource::System, "x").is_prompt());
        assert!(!Memory::assistant(id.clone(), "x").is_prompt());
        assert!(!Memory::tool(id, "x").is_prompt());
    }
}
