//! Pooled account management.

use anyhow::Result;

use zoea_core::Account;

use super::App;
use crate::cli::AccountAction;
use crate::output;

pub fn handle(app: App, action: AccountAction) -> Result<()> {
    match action {
        AccountAction::Add { username, password } => {
            app.store.create_account(&Account::new(&username, password))?;
            output::success(&format!("account {username} added to the pool"));
            Ok(())
        }
        AccountAction::List => {
            let accounts = app.store.list_accounts()?;
            let rows: Vec<Vec<String>> = accounts
                .iter()
                .map(|a| {
                    vec![
                        a.username.clone(),
                        if a.in_use { "in use" } else { "available" }.to_string(),
                        a.claimed_by.clone(),
                    ]
                })
                .collect();
            if rows.is_empty() {
                output::info("no accounts in the pool");
            } else {
                output::table(&["username", "status", "claimed by"], rows);
            }
            Ok(())
        }
        AccountAction::ReleaseAll => {
            app.store.release_all_accounts()?;
            output::success("all account claims released");
            Ok(())
        }
    }
}
