//! Account pool façade over the store.
//!
//! The store enforces single-holder claims atomically; this layer adds the
//! bounded retry on claim contention and the recovery entry points.

use std::sync::Arc;

use tracing::{info, warn};

use zoea_core::{Account, CoreError, MysisId, Store};

/// Attempts before a contended claim gives up.
const CLAIM_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct AccountPool {
    store: Arc<Store>,
}

impl AccountPool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Claim one available account for a mysis. Returns `None` when the pool
    /// is exhausted; retries a bounded number of times on contention.
    pub fn claim(&self, mysis_id: &MysisId) -> Result<Option<Account>, CoreError> {
        for attempt in 1..=CLAIM_ATTEMPTS {
            match self.store.claim_account(mysis_id)? {
                Some(account) => {
                    info!(mysis = %mysis_id, account = %account.username, "claimed account");
                    return Ok(Some(account));
                }
                None => {
                    // Either exhausted or a lost race; only retry the race.
                    if self.store.list_available_accounts()?.is_empty() {
                        return Ok(None);
                    }
                    warn!(mysis = %mysis_id, attempt, "account claim contention, retrying");
                }
            }
        }
        Ok(None)
    }

    /// Idempotent release by username.
    pub fn release(&self, username: &str) -> Result<(), CoreError> {
        self.store.release_account(username)
    }

    /// Startup crash recovery: clear every claim.
    pub fn release_all(&self) -> Result<(), CoreError> {
        self.store.release_all_accounts()
    }

    /// Orphan recovery when a mysis is deleted, stopped or errored.
    pub fn release_by_mysis(&self, mysis_id: &MysisId) -> Result<(), CoreError> {
        self.store.release_accounts_by_mysis(mysis_id)
    }
}
