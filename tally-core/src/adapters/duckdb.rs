//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection, Row};
use tracing::warn;

use crate::domain::result::{Error, Result};
use crate::domain::{generate_account_number, Account, NewAccount};
use crate::services::audit::AuditEntry;
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Attempts at drawing an unused account number before giving up
const MAX_NUMBER_ATTEMPTS: u32 = 16;

/// `created_at` is a TIMESTAMP read back as epoch microseconds
const ACCOUNT_COLUMNS: &str =
    "id, number, first_name, last_name, credential_hash, balance, epoch_us(created_at)";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB repository implementation
///
/// A single connection sits behind a mutex, so every store operation (and
/// every ledger transaction) has exclusive use of the database for its
/// duration. Balance updates inside `with_transaction` are additionally
/// conditional, so correctness does not rest on the mutex alone.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff on file locking errors, which show up
    /// when another process still holds the file (e.g. a CLI command running
    /// next to the server).
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRIES,
                            "database busy, retrying: {}",
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(Error::unavailable(err_msg));
                }
            }
        }

        Err(Error::unavailable(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("failed to open database after {} retries", MAX_RETRIES)),
        ))
    }

    /// In-memory database, used by tests and throwaway runs
    pub fn in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off: nothing here needs extensions and
        // cached ones can fail code signing checks on macOS
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::unavailable(format!("connection lock poisoned: {}", e)))
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    // === Account operations ===

    /// Insert a new account, assigning its id and a unique account number
    pub fn insert_account(&self, new_account: &NewAccount) -> Result<Account> {
        let conn = self.lock()?;

        let number = Self::unused_account_number(&conn)?;
        let id: i64 = conn.query_row("SELECT nextval('seq_account_id')", [], |row| row.get(0))?;

        conn.execute(
            "INSERT INTO accounts (id, number, first_name, last_name, credential_hash, balance, created_at)
             VALUES (?, ?, ?, ?, ?, 0, make_timestamp(?))",
            params![
                id,
                number,
                new_account.first_name,
                new_account.last_name,
                new_account.credential_hash,
                Utc::now().timestamp_micros(),
            ],
        )?;

        // Read back so the caller sees the stored (microsecond) timestamp
        select_account(&conn, "id", id)?
            .ok_or_else(|| Error::database(format!("account {} vanished after insert", id)))
    }

    fn unused_account_number(conn: &Connection) -> Result<i64> {
        for _ in 0..MAX_NUMBER_ATTEMPTS {
            let candidate = generate_account_number();
            let taken: i64 = conn.query_row(
                "SELECT COUNT(*) FROM accounts WHERE number = ?",
                [candidate],
                |row| row.get(0),
            )?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
        Err(Error::database("could not allocate a unique account number"))
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM accounts ORDER BY id", ACCOUNT_COLUMNS))?;
        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    pub fn get_account_by_id(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.lock()?;
        select_account(&conn, "id", id)
    }

    pub fn get_account_by_number(&self, number: i64) -> Result<Option<Account>> {
        let conn = self.lock()?;
        select_account(&conn, "number", number)
    }

    /// Update the mutable name fields. Returns the updated account, or `None`
    /// if it no longer exists.
    pub fn update_account_names(
        &self,
        id: i64,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE accounts
             SET first_name = COALESCE(?, first_name),
                 last_name = COALESCE(?, last_name)
             WHERE id = ?",
            params![first_name, last_name, id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        select_account(&conn, "id", id)
    }

    /// Hard delete. Returns false if there was nothing to delete.
    pub fn delete_account(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM accounts WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    pub fn account_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Sum of all balances. Transfers never change it.
    ///
    /// Each balance fits in an i64 but their sum may not, so the HUGEINT
    /// result is read as i128.
    pub fn total_balance(&self) -> Result<i128> {
        let conn = self.lock()?;
        let total: i128 = conn.query_row(
            "SELECT CAST(COALESCE(SUM(balance), 0) AS HUGEINT) FROM accounts",
            [],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // === Ledger transactions ===

    /// Run `f` inside one store transaction
    ///
    /// Commits if `f` returns `Ok`; any error (or a panic) drops the
    /// transaction, which rolls it back, so partial writes are never visible.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&LedgerTransaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = LedgerTransaction {
            tx: conn.transaction()?,
        };
        let value = f(&tx)?;
        tx.tx.commit()?;
        Ok(value)
    }

    // === Audit events ===

    pub fn insert_audit_event(&self, entry: &AuditEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_audit_events (id, timestamp, event, account_number, account_id, reason)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                entry.id,
                entry.timestamp,
                entry.event,
                entry.account_number,
                entry.account_id,
                entry.reason,
            ],
        )?;
        Ok(())
    }

    /// Most recent audit events first. `denials_only` keeps events that carry
    /// a reason.
    pub fn recent_audit_events(&self, limit: usize, denials_only: bool) -> Result<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let filter = if denials_only {
            "WHERE reason IS NOT NULL"
        } else {
            ""
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT id, timestamp, event, account_number, account_id, reason
             FROM sys_audit_events
             {}
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
            filter
        ))?;

        let entries = stmt
            .query_map([limit as i64], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    event: row.get(2)?,
                    account_number: row.get(3)?,
                    account_id: row.get(4)?,
                    reason: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn count_audit_events(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sys_audit_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_audit_denials(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_audit_events WHERE reason IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn oldest_audit_timestamp(&self) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let oldest: Option<i64> =
            conn.query_row("SELECT MIN(timestamp) FROM sys_audit_events", [], |row| row.get(0))?;
        Ok(oldest)
    }

    /// Delete audit events older than the given unix-ms timestamp
    pub fn delete_audit_events_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM sys_audit_events WHERE timestamp < ?",
            [timestamp_ms],
        )?;
        Ok(deleted as u64)
    }
}

/// Handle on an open store transaction
///
/// Exposes only the row operations the ledger needs. Balance changes are
/// conditional updates evaluated by the database, never a read followed by a
/// blind write.
pub struct LedgerTransaction<'conn> {
    tx: duckdb::Transaction<'conn>,
}

impl LedgerTransaction<'_> {
    pub fn account_by_id(&self, id: i64) -> Result<Option<Account>> {
        select_account(&self.tx, "id", id)
    }

    pub fn account_by_number(&self, number: i64) -> Result<Option<Account>> {
        select_account(&self.tx, "number", number)
    }

    /// Subtract `amount` if the balance covers it. Returns false when the row
    /// is missing or the balance is too low; nothing is written in that case.
    pub fn debit(&self, id: i64, amount: i64) -> Result<bool> {
        let changed = self.tx.execute(
            "UPDATE accounts SET balance = balance - ? WHERE id = ? AND balance >= ?",
            params![amount, id, amount],
        )?;
        Ok(changed == 1)
    }

    /// Add `amount`. Returns false when the row is missing or the sum would
    /// overflow.
    pub fn credit(&self, id: i64, amount: i64) -> Result<bool> {
        let headroom = i64::MAX - amount;
        let changed = self.tx.execute(
            "UPDATE accounts SET balance = balance + ? WHERE id = ? AND balance <= ?",
            params![amount, id, headroom],
        )?;
        Ok(changed == 1)
    }

    pub fn balance_of(&self, id: i64) -> Result<Option<i64>> {
        let mut stmt = self.tx.prepare("SELECT balance FROM accounts WHERE id = ?")?;
        let balance = stmt.query_map([id], |row| row.get(0))?.next().transpose()?;
        Ok(balance)
    }
}

fn select_account(conn: &Connection, column: &str, value: i64) -> Result<Option<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM accounts WHERE {} = ?",
        ACCOUNT_COLUMNS, column
    ))?;
    let account = stmt.query_map([value], row_to_account)?.next().transpose()?;
    Ok(account)
}

fn row_to_account(row: &Row<'_>) -> duckdb::Result<Account> {
    // Column order follows ACCOUNT_COLUMNS
    let created_us: i64 = row.get(6)?;
    let created_at = DateTime::<Utc>::from_timestamp_micros(created_us).ok_or_else(|| {
        duckdb::Error::FromSqlConversionFailure(
            6,
            Type::BigInt,
            format!("created_at out of range: {}", created_us).into(),
        )
    })?;
    Ok(Account {
        id: row.get(0)?,
        number: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        credential_hash: row.get(4)?,
        balance: row.get(5)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn new_account(first: &str) -> NewAccount {
        NewAccount {
            first_name: first.to_string(),
            last_name: "Tester".to_string(),
            credential_hash: "hash".to_string(),
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("IO Error: database is locked"));
        assert!(is_retryable_error("The process cannot access the file"));
        assert!(!is_retryable_error("Catalog Error: table does not exist"));
    }

    #[test]
    fn test_insert_and_lookup() {
        let repo = repo();
        let created = repo.insert_account(&new_account("Ann")).unwrap();

        let by_id = repo.get_account_by_id(created.id).unwrap().unwrap();
        let by_number = repo.get_account_by_number(created.number).unwrap().unwrap();
        assert_eq!(by_id.number, created.number);
        assert_eq!(by_number.id, created.id);
        assert_eq!(by_id.balance, 0);
        assert_eq!(by_id.credential_hash, "hash");
        assert_eq!(by_id.created_at, created.created_at);
        assert!((Utc::now() - created.created_at).num_seconds() < 60);
    }

    #[test]
    fn test_ids_and_numbers_are_distinct_per_account() {
        let repo = repo();
        let a = repo.insert_account(&new_account("Ann")).unwrap();
        let b = repo.insert_account(&new_account("Bob")).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.number, b.number);
        assert_eq!(repo.list_accounts().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_rows_are_none() {
        let repo = repo();
        assert!(repo.get_account_by_id(42).unwrap().is_none());
        assert!(repo.get_account_by_number(12_345_678).unwrap().is_none());
        assert!(!repo.delete_account(42).unwrap());
        assert!(repo.update_account_names(42, Some("X"), None).unwrap().is_none());
    }

    #[test]
    fn test_update_keeps_unset_fields() {
        let repo = repo();
        let created = repo.insert_account(&new_account("Ann")).unwrap();
        let updated = repo
            .update_account_names(created.id, None, Some("Smith"))
            .unwrap()
            .unwrap();
        assert_eq!(updated.first_name, "Ann");
        assert_eq!(updated.last_name, "Smith");
        assert_eq!(updated.number, created.number);
    }

    #[test]
    fn test_conditional_debit_refuses_overdraft() {
        let repo = repo();
        let a = repo.insert_account(&new_account("Ann")).unwrap();

        repo.with_transaction(|tx| {
            assert!(tx.credit(a.id, 100)?);
            assert!(!tx.debit(a.id, 101)?);
            assert!(tx.debit(a.id, 100)?);
            Ok(())
        })
        .unwrap();

        assert_eq!(repo.get_account_by_id(a.id).unwrap().unwrap().balance, 0);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let repo = repo();
        let a = repo.insert_account(&new_account("Ann")).unwrap();

        let result: Result<()> = repo.with_transaction(|tx| {
            tx.credit(a.id, 500)?;
            Err(Error::InsufficientFunds)
        });

        assert!(matches!(result, Err(Error::InsufficientFunds)));
        assert_eq!(repo.get_account_by_id(a.id).unwrap().unwrap().balance, 0);
    }

    #[test]
    fn test_credit_refuses_overflow() {
        let repo = repo();
        let a = repo.insert_account(&new_account("Ann")).unwrap();
        let overflowed = repo
            .with_transaction(|tx| {
                tx.credit(a.id, i64::MAX)?;
                tx.credit(a.id, 1)
            })
            .unwrap();
        assert!(!overflowed);
        assert_eq!(repo.total_balance().unwrap(), i128::from(i64::MAX));
    }

    #[test]
    fn test_total_balance_beyond_i64() {
        let repo = repo();
        let a = repo.insert_account(&new_account("Ann")).unwrap();
        let b = repo.insert_account(&new_account("Bob")).unwrap();
        repo.with_transaction(|tx| {
            assert!(tx.credit(a.id, i64::MAX)?);
            assert!(tx.credit(b.id, i64::MAX)?);
            Ok(())
        })
        .unwrap();

        assert_eq!(repo.total_balance().unwrap(), 2 * i128::from(i64::MAX));
    }
}
