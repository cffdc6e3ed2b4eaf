//! Ledger service - account lifecycle and balance movements
//!
//! Every balance change runs inside one store transaction. Transfers debit
//! the source with a conditional update before crediting the destination, so
//! two racing transfers can never both spend the same funds.

use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountUpdate, BalanceReceipt, NewAccount, TransferIntent};
use crate::services::audit::{events, AuditEvent, AuditService};
use crate::services::credentials::CredentialStore;

pub struct LedgerService {
    repository: Arc<DuckDbRepository>,
    credentials: Arc<CredentialStore>,
    audit: Arc<AuditService>,
}

impl LedgerService {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        credentials: Arc<CredentialStore>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            repository,
            credentials,
            audit,
        }
    }

    /// Register an account with a zero balance
    pub fn create_account(
        &self,
        first_name: &str,
        last_name: &str,
        password: &str,
    ) -> Result<Account> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        NewAccount::validate_names(first_name, last_name).map_err(Error::validation)?;
        if password.is_empty() {
            return Err(Error::validation("password cannot be empty"));
        }

        let new_account = NewAccount {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            credential_hash: self.credentials.hash(password)?,
        };
        let account = self.repository.insert_account(&new_account)?;

        info!(account_id = account.id, number = account.number, "account created");
        self.audit.record_quietly(
            AuditEvent::new(events::ACCOUNT_CREATED)
                .with_account_id(account.id)
                .with_account_number(account.number),
        );
        Ok(account)
    }

    pub fn get_account(&self, id: i64) -> Result<Account> {
        self.repository
            .get_account_by_id(id)?
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    pub fn get_account_by_number(&self, number: i64) -> Result<Account> {
        self.repository
            .get_account_by_number(number)?
            .ok_or_else(|| Error::not_found(format!("account number {}", number)))
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.repository.list_accounts()
    }

    /// Change the holder's names. Fields left out of the update are kept.
    pub fn update_account(&self, id: i64, update: &AccountUpdate) -> Result<Account> {
        if update.is_empty() {
            return Err(Error::validation("nothing to update"));
        }

        let current = self.get_account(id)?;
        let first_name = update
            .first_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(current.first_name.as_str());
        let last_name = update
            .last_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(current.last_name.as_str());
        NewAccount::validate_names(first_name, last_name).map_err(Error::validation)?;

        let updated = self
            .repository
            .update_account_names(
                id,
                update.first_name.as_deref().map(str::trim),
                update.last_name.as_deref().map(str::trim),
            )?
            .ok_or_else(|| Error::not_found(format!("account {}", id)))?;

        self.audit.record_quietly(
            AuditEvent::new(events::ACCOUNT_UPDATED)
                .with_account_id(updated.id)
                .with_account_number(updated.number),
        );
        Ok(updated)
    }

    pub fn delete_account(&self, id: i64) -> Result<()> {
        let account = self.get_account(id)?;
        if !self.repository.delete_account(id)? {
            return Err(Error::not_found(format!("account {}", id)));
        }

        info!(account_id = id, number = account.number, "account deleted");
        self.audit.record_quietly(
            AuditEvent::new(events::ACCOUNT_DELETED)
                .with_account_id(id)
                .with_account_number(account.number),
        );
        Ok(())
    }

    /// Move `amount` from the source account to the destination number
    ///
    /// Either both balances change or neither does. The receipt carries the
    /// source balance as of the commit.
    pub fn transfer(&self, intent: TransferIntent) -> Result<BalanceReceipt> {
        if intent.amount <= 0 {
            return Err(Error::validation("amount must be a positive integer"));
        }

        let result = self.repository.with_transaction(|tx| {
            let source = tx
                .account_by_id(intent.source_account_id)?
                .ok_or_else(|| {
                    Error::not_found(format!("account {}", intent.source_account_id))
                })?;
            if source.number == intent.destination_account_number {
                return Err(Error::validation("cannot transfer to the same account"));
            }
            let destination = tx
                .account_by_number(intent.destination_account_number)?
                .ok_or_else(|| {
                    Error::not_found(format!(
                        "account number {}",
                        intent.destination_account_number
                    ))
                })?;

            if !tx.debit(source.id, intent.amount)? {
                return Err(Error::InsufficientFunds);
            }
            if !tx.credit(destination.id, intent.amount)? {
                return Err(match tx.balance_of(destination.id)? {
                    None => Error::not_found(format!(
                        "account number {}",
                        intent.destination_account_number
                    )),
                    Some(_) => Error::validation("destination balance would overflow"),
                });
            }

            let balance = tx
                .balance_of(source.id)?
                .ok_or_else(|| Error::not_found(format!("account {}", source.id)))?;
            Ok(BalanceReceipt {
                number: source.number,
                balance,
            })
        });

        match &result {
            Ok(receipt) => {
                info!(
                    source = receipt.number,
                    destination = intent.destination_account_number,
                    amount = intent.amount,
                    "transfer committed"
                );
                self.audit.record_quietly(
                    AuditEvent::new(events::TRANSFER_COMPLETED)
                        .with_account_id(intent.source_account_id)
                        .with_account_number(receipt.number),
                );
            }
            Err(Error::InsufficientFunds) => {
                warn!(
                    source_id = intent.source_account_id,
                    amount = intent.amount,
                    "transfer rejected: insufficient funds"
                );
                self.audit.record_quietly(
                    AuditEvent::new(events::TRANSFER_REJECTED)
                        .with_account_id(intent.source_account_id)
                        .with_reason("insufficient_funds"),
                );
            }
            Err(_) => {}
        }
        result
    }

    /// Add funds to an account
    pub fn deposit(&self, id: i64, amount: i64) -> Result<BalanceReceipt> {
        if amount <= 0 {
            return Err(Error::validation("amount must be a positive integer"));
        }

        let receipt = self.repository.with_transaction(|tx| {
            let account = tx
                .account_by_id(id)?
                .ok_or_else(|| Error::not_found(format!("account {}", id)))?;
            if !tx.credit(account.id, amount)? {
                return Err(Error::validation("balance would overflow"));
            }
            let balance = tx
                .balance_of(account.id)?
                .ok_or_else(|| Error::not_found(format!("account {}", id)))?;
            Ok(BalanceReceipt {
                number: account.number,
                balance,
            })
        })?;

        info!(account_id = id, amount, "deposit committed");
        self.audit.record_quietly(
            AuditEvent::new(events::DEPOSIT_COMPLETED)
                .with_account_id(id)
                .with_account_number(receipt.number),
        );
        Ok(receipt)
    }
}
