use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryRole;
use crate::mysis::MysisState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MysisCreated,
    MysisDeleted,
    MysisStateChanged,
    MysisConfigChanged,
    MysisMessage,
    MysisResponse,
    MysisError,
    Broadcast,
    NetworkLlm,
    NetworkMcp,
    NetworkIdle,
    RateLimit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Message { role: MemoryRole, content: String },

    StateChange { old: MysisState, new: MysisState },

    ConfigChange { provider: String, model: String },

    Error { error: String },

    None,
}

/// An observability event fanned out by the bus. Lossy delivery except where
/// the publisher uses the blocking path (state changes, errors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmEvent {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mysis_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mysis_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl SwarmEvent {
    fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            kind,
            mysis_id: None,
            mysis_name: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn for_mysis(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.mysis_id = Some(id.into());
        self.mysis_name = Some(name.into());
        self
    }

    pub fn mysis_created(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(EventKind::MysisCreated, EventPayload::None).for_mysis(id, name)
    }

    pub fn mysis_deleted(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(EventKind::MysisDeleted, EventPayload::None).for_mysis(id, name)
    }

    pub fn state_changed(old: MysisState, new: MysisState) -> Self {
        Self::new(
            EventKind::MysisStateChanged,
            EventPayload::StateChange { old, new },
        )
    }

    pub fn config_changed(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(
            EventKind::MysisConfigChanged,
            EventPayload::ConfigChange {
                provider: provider.into(),
                model: model.into(),
            },
        )
    }

    pub fn message(role: MemoryRole, content: impl Into<String>) -> Self {
        Self::new(
            EventKind::MysisMessage,
            EventPayload::Message {
                role,
                content: content.into(),
            },
        )
    }

    pub fn response(content: impl Into<String>) -> Self {
        Self::new(
            EventKind::MysisResponse,
            EventPayload::Message {
                role: MemoryRole::Assistant,
                content: content.into(),
            },
        )
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::new(
            EventKind::MysisError,
            EventPayload::Error {
                error: error.into(),
            },
        )
    }

    pub fn broadcast(content: impl Into<String>) -> Self {
        Self::new(
            EventKind::Broadcast,
            EventPayload::Message {
                role: MemoryRole::User,
                content: content.into(),
            },
        )
    }

    pub fn network_llm() -> Self {
        Self::new(EventKind::NetworkLlm, EventPayload::None)
    }

    pub fn network_mcp() -> Self {
        Self::new(EventKind::NetworkMcp, EventPayload::None)
    }

    pub fn network_idle() -> Self {
        Self::new(EventKind::NetworkIdle, EventPayload::None)
    }

    pub fn rate_limit(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(
            EventKind::RateLimit,
            EventPayload::ConfigChange {
                provider: provider.into(),
                model: model.into(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&EventKind::MysisStateChanged).unwrap();
        assert_eq!(json, "\"mysis_state_changed\"");
    }

    #[test]
    fn test_state_changed() {
        let event = SwarmEvent::state_changed(MysisState::Running, MysisState::Stopped)
            .for_mysis("m1", "scout");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"state_change"#));
        assert!(json.contains(r#""old":"running"#));
        assert!(json.contains(r#""new":"stopped"#));
        assert!(json.contains("scout"));
    }

    #[test]
    fn test_message_event() {
        let event = SwarmEvent::message(MemoryRole::Tool, "scan complete");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"message"#));
        assert!(json.contains("scan complete"));
    }

    #[test]
    fn test_error_event() {
        let event = SwarmEvent::error("provider unreachable");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"error"#));
        assert!(json.contains("provider unreachable"));
    }

    #[test]
    fn test_network_events_have_no_payload() {
        for event in [
            SwarmEvent::network_llm(),
            SwarmEvent::network_mcp(),
            SwarmEvent::network_idle(),
        ] {
            let json = serde_json::to_string(&event).unwrap();
            assert!(json.contains(r#""type":"none"#));
            assert!(event.mysis_id.is_none());
        }
    }

    #[test]
    fn test_rate_limit_event() {
        let event = SwarmEvent::rate_limit("openai", "gpt-4o-mini");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("gpt-4o-mini"));
        assert_eq!(event.kind, EventKind::RateLimit);
    }

    #[test]
    fn test_all_constructors_roundtrip() {
        let events = vec![
            SwarmEvent::mysis_created("m1", "a"),
            SwarmEvent::mysis_deleted("m1", "a"),
            SwarmEvent::state_changed(MysisState::Idle, MysisState::Running),
            SwarmEvent::config_changed("openai", "gpt-4o-mini"),
            SwarmEvent::message(MemoryRole::User, "hi"),
            SwarmEvent::response("hello"),
            SwarmEvent::error("boom"),
            SwarmEvent::broadcast("all hands"),
            SwarmEvent::network_llm(),
            SwarmEvent::network_mcp(),
            SwarmEvent::network_idle(),
            SwarmEvent::rate_limit("openai", "gpt-4o-mini"),
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let decoded: SwarmEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded.kind, event.kind);
        }
    }
}
