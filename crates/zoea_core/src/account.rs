use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shared external credential from the pool. At most one mysis holds
/// `in_use` for a given account at any instant; `claimed_by` records the
/// holder so orphaned claims can be recovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub in_use: bool,
    pub claimed_by: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            in_use: false,
            claimed_by: String::new(),
            last_used_at: None,
            created_at: Utc::now(),
        }
    }
}
