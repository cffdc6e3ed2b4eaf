//! Status service - ledger summary for operators

use std::sync::Arc;

use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;

pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let accounts = self.repository.list_accounts()?;
        let total_balance = self.repository.total_balance()?;
        let audit_events = self.repository.count_audit_events()?;

        Ok(StatusSummary {
            total_accounts: accounts.len() as i64,
            total_balance,
            audit_events,
            database: self
                .repository
                .db_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string()),
            accounts: accounts
                .into_iter()
                .map(|a| AccountSummary {
                    id: a.id,
                    number: a.number,
                    name: a.full_name(),
                    balance: a.balance,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total_accounts: i64,
    /// Sum of all balances; transfers never change it. Wider than a single
    /// balance because the sum can exceed i64.
    pub total_balance: i128,
    pub audit_events: u64,
    pub database: String,
    pub accounts: Vec<AccountSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: i64,
    pub number: i64,
    pub name: String,
    pub balance: i64,
}
