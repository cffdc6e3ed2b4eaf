//! Migration service - applies the embedded schema in order
//!
//! `sys_migrations` records each applied file. A migration and its record are
//! written in one transaction, so a failed migration leaves nothing behind
//! and is retried on the next start.

use chrono::Utc;
use duckdb::Connection;
use tracing::info;

use crate::domain::result::{Error, Result};
use crate::migrations::MIGRATIONS;

const BOOTSTRAP_MIGRATION: &str = "000_migrations.sql";

/// Outcome of `MigrationService::run_pending`
#[derive(Debug)]
pub struct MigrationResult {
    /// Migrations applied by this run, in order
    pub applied: Vec<String>,
    /// Migrations found already recorded
    pub already_applied: usize,
}

pub struct MigrationService<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply every migration that is not yet recorded
    pub fn run_pending(&self) -> Result<MigrationResult> {
        // The bootstrap file only creates sys_migrations and is idempotent
        let bootstrap_needed = !self.tracking_table_exists()?;
        if bootstrap_needed {
            self.conn.execute_batch(bootstrap_sql()?)?;
        }

        let recorded = self.get_applied()?;
        let mut applied = Vec::new();
        for (name, sql) in MIGRATIONS {
            if recorded.iter().any(|r| r == name) {
                continue;
            }
            let body = (*name != BOOTSTRAP_MIGRATION).then_some(*sql);
            self.apply(name, body)?;
            info!(migration = *name, "applied migration");
            applied.push(name.to_string());
        }

        Ok(MigrationResult {
            applied,
            already_applied: recorded.len(),
        })
    }

    /// Names of recorded migrations, sorted
    pub fn get_applied(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Names of embedded migrations not yet recorded, in apply order
    pub fn get_pending(&self) -> Result<Vec<String>> {
        let recorded = self.get_applied()?;
        Ok(MIGRATIONS
            .iter()
            .map(|(name, _)| name.to_string())
            .filter(|name| !recorded.contains(name))
            .collect())
    }

    fn tracking_table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Run `sql` (if any) and record `name`, atomically
    fn apply(&self, name: &str, sql: Option<&str>) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        let outcome = sql.map_or(Ok(()), |sql| self.conn.execute_batch(sql)).and_then(|_| {
            self.conn.execute(
                "INSERT INTO sys_migrations (migration_name, applied_at) VALUES (?, ?)",
                duckdb::params![name, Utc::now().timestamp_millis()],
            )
        });
        match outcome {
            Ok(_) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(Error::database(format!("migration {} failed: {}", name, e)))
            }
        }
    }
}

fn bootstrap_sql() -> Result<&'static str> {
    MIGRATIONS
        .iter()
        .find(|(name, _)| *name == BOOTSTRAP_MIGRATION)
        .map(|(_, sql)| *sql)
        .ok_or_else(|| Error::database("bootstrap migration is missing"))
}
