//! Pooled account persistence with single-holder claims.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{format_ts, parse_ts, Store};
use crate::account::Account;
use crate::error::{CoreError, Result};
use crate::mysis::MysisId;

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        username: row.get(0)?,
        password: row.get(1)?,
        in_use: row.get::<_, i64>(2)? != 0,
        claimed_by: row.get(3)?,
        last_used_at: row
            .get::<_, Option<String>>(4)?
            .map(|raw| parse_ts(&raw)),
        created_at: parse_ts(&row.get::<_, String>(5)?),
    })
}

const COLUMNS: &str = "username, password, in_use, claimed_by, last_used_at, created_at";

impl Store {
    pub fn create_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (username, password, in_use, claimed_by, last_used_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                account.username,
                account.password,
                account.in_use as i64,
                account.claimed_by,
                account.last_used_at.map(format_ts),
                format_ts(account.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_account(&self, username: &str) -> Result<Account> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM accounts WHERE username = ?1"),
            params![username],
            account_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("account {}", username)))
    }

    /// Every account, oldest first.
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM accounts ORDER BY created_at, username"
        ))?;
        let rows = stmt.query_map([], account_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Unclaimed accounts, oldest first.
    pub fn list_available_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM accounts WHERE in_use = 0 ORDER BY created_at, username"
        ))?;
        let rows = stmt.query_map([], account_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Atomically claim the oldest available account for a mysis. Returns
    /// `None` when the pool is exhausted.
    pub fn claim_account(&self, mysis_id: &MysisId) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let candidate: Option<String> = tx
            .query_row(
                "SELECT username FROM accounts WHERE in_use = 0 ORDER BY created_at, username LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(username) = candidate else {
            return Ok(None);
        };

        let n = tx.execute(
            "UPDATE accounts SET in_use = 1, claimed_by = ?1, last_used_at = ?2
             WHERE username = ?3 AND in_use = 0",
            params![mysis_id.as_str(), format_ts(Utc::now()), username],
        )?;
        if n == 0 {
            // Lost the row between select and update; caller retries.
            return Ok(None);
        }

        let account = tx.query_row(
            &format!("SELECT {COLUMNS} FROM accounts WHERE username = ?1"),
            params![username],
            account_from_row,
        )?;
        tx.commit()?;
        Ok(Some(account))
    }

    /// Mark a specific account as held by a mysis.
    pub fn mark_account_in_use(&self, username: &str, mysis_id: &MysisId) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE accounts SET in_use = 1, claimed_by = ?1, last_used_at = ?2 WHERE username = ?3",
            params![mysis_id.as_str(), format_ts(Utc::now()), username],
        )?;
        if n == 0 {
            return Err(CoreError::NotFound(format!("account {}", username)));
        }
        Ok(())
    }

    /// Clear a claim. Idempotent; unknown usernames are ignored.
    pub fn release_account(&self, username: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE accounts SET in_use = 0, claimed_by = '' WHERE username = ?1",
            params![username],
        )?;
        Ok(())
    }

    /// Clear every claim (startup crash recovery).
    pub fn release_all_accounts(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE accounts SET in_use = 0, claimed_by = ''", [])?;
        Ok(())
    }

    /// Clear claims held by one mysis (orphan recovery on delete/stop/error).
    pub fn release_accounts_by_mysis(&self, mysis_id: &MysisId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE accounts SET in_use = 0, claimed_by = '' WHERE claimed_by = ?1",
            params![mysis_id.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_accounts(names: &[&str]) -> Store {
        let store = Store::open_memory().unwrap();
        for name in names {
            store.create_account(&Account::new(*name, "pw")).unwrap();
        }
        store
    }

    #[test]
    fn test_create_and_get() {
        let store = store_with_accounts(&["user1"]);
        let account = store.get_account("user1").unwrap();
        assert_eq!(account.username, "user1");
        assert!(!account.in_use);
    }

    #[test]
    fn test_get_missing() {
        let store = store_with_accounts(&[]);
        assert!(matches!(
            store.get_account("nobody").unwrap_err(),
            CoreError::NotFound(_)
        ));
    }

    #[test]
    fn test_claim_takes_oldest() {
        let store = store_with_accounts(&["user1", "user2"]);
        let mysis = MysisId::new();

        let claimed = store.claim_account(&mysis).unwrap().unwrap();
        assert_eq!(claimed.username, "user1");
        assert!(claimed.in_use);
        assert_eq!(claimed.claimed_by, mysis.as_str());
        assert!(claimed.last_used_at.is_some());

        let available = store.list_available_accounts().unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].username, "user2");
    }

    #[test]
    fn test_claim_exhausted_pool() {
        let store = store_with_accounts(&["user1"]);
        let mysis = MysisId::new();
        assert!(store.claim_account(&mysis).unwrap().is_some());
        assert!(store.claim_account(&mysis).unwrap().is_none());
    }

    #[test]
    fn test_single_holder() {
        let store = store_with_accounts(&["user1", "user2", "user3"]);
        let a = MysisId::new();
        let b = MysisId::new();

        let first = store.claim_account(&a).unwrap().unwrap();
        let second = store.claim_account(&b).unwrap().unwrap();
        assert_ne!(first.username, second.username);
    }

    #[test]
    fn test_list_accounts_includes_claimed() {
        let store = store_with_accounts(&["user1", "user2"]);
        store.claim_account(&MysisId::new()).unwrap();

        assert_eq!(store.list_accounts().unwrap().len(), 2);
        assert_eq!(store.list_available_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_release_idempotent() {
        let store = store_with_accounts(&["user1"]);
        let mysis = MysisId::new();
        store.claim_account(&mysis).unwrap().unwrap();

        store.release_account("user1").unwrap();
        store.release_account("user1").unwrap();

        let account = store.get_account("user1").unwrap();
        assert!(!account.in_use);
        assert!(account.claimed_by.is_empty());
    }

    #[test]
    fn test_release_all() {
        let store = store_with_accounts(&["user1", "user2"]);
        let mysis = MysisId::new();
        store.claim_account(&mysis).unwrap();
        store.claim_account(&mysis).unwrap();

        store.release_all_accounts().unwrap();
        assert_eq!(store.list_available_accounts().unwrap().len(), 2);
    }

    #[test]
    fn test_release_by_mysis() {
        let store = store_with_accounts(&["user1", "user2"]);
        let a = MysisId::new();
        let b = MysisId::new();
        store.claim_account(&a).unwrap();
        store.claim_account(&b).unwrap();

        store.release_accounts_by_mysis(&a).unwrap();
        let available = store.list_available_accounts().unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].username, "user1");
    }

    #[test]
    fn test_mark_in_use() {
        let store = store_with_accounts(&["user1"]);
        let mysis = MysisId::new();
        store.mark_account_in_use("user1", &mysis).unwrap();

        let account = store.get_account("user1").unwrap();
        assert!(account.in_use);
        assert_eq!(account.claimed_by, mysis.as_str());
    }
}
