use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MysisId(pub String);

impl MysisId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MysisId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MysisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MysisId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a mysis. `Idle` is the initial state; `Errored` is
/// recoverable through Start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MysisState {
    Idle,
    Running,
    Stopped,
    Errored,
}

impl Default for MysisState {
    fn default() -> Self {
        MysisState::Idle
    }
}

impl MysisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MysisState::Idle => "idle",
            MysisState::Running => "running",
            MysisState::Stopped => "stopped",
            MysisState::Errored => "errored",
        }
    }
}

impl FromStr for MysisState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(MysisState::Idle),
            "running" => Ok(MysisState::Running),
            "stopped" => Ok(MysisState::Stopped),
            "errored" => Ok(MysisState::Errored),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for MysisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// LLM configuration for a mysis. Takes effect on the next turn when changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysisConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f64,
}

impl MysisConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: String::new(),
            temperature: 1.0,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// The persisted form of a mysis, as stored and hydrated by the Commander.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysisRecord {
    pub id: MysisId,
    pub name: String,
    pub config: MysisConfig,
    pub state: MysisState,
    pub created_at: DateTime<Utc>,
}

impl MysisRecord {
    pub fn new(name: impl Into<String>, config: MysisConfig) -> Self {
        Self {
            id: MysisId::new(),
            name: name.into(),
            config,
            state: MysisState::Idle,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysis_id_new() {
        let id = MysisId::new();
        assert!(!id.0.is_empty());
        assert_eq!(id.as_str().len(), 36); // UUID format
    }

    #[test]
    fn test_mysis_id_display() {
        let id = MysisId::new();
        assert_eq!(format!("{}", id), id.as_str());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&MysisState::Running).unwrap();
        assert_eq!(json, "\"running\"");

        let decoded: MysisState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, MysisState::Running);
    }

    #[test]
    fn test_state_roundtrip_str() {
        let states = vec![
            MysisState::Idle,
            MysisState::Running,
            MysisState::Stopped,
            MysisState::Errored,
        ];
        for state in states {
            assert_eq!(state.as_str().parse::<MysisState>(), Ok(state));
        }
        assert!("bogus".parse::<MysisState>().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = MysisConfig::new("openai")
            .with_model("gpt-4o-mini")
            .with_temperature(0.3);
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.temperature, 0.3);
    }

    #[test]
    fn test_record_new() {
        let record = MysisRecord::new("scout-1", MysisConfig::new("openai"));
        assert_eq!(record.name, "scout-1");
        assert_eq!(record.state, MysisState::Idle);
        assert!(!record.id.0.is_empty());
    }

    #[test]
    fn test_record_serialization() {
        let record = MysisRecord::new("scout-1", MysisConfig::new("openai"));
        let json = serde_json::to_string(&record).unwrap();
        let decoded: MysisRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.id, record.id);
        assert_eq!(decoded.name, record.name);
    }
}
