//! Audit service - structured security events stored next to the ledger
//!
//! Records logins, denied requests and ledger movements in `sys_audit_events`.
//! Entries carry account identifiers and a short machine-readable reason, and
//! never tokens, passwords or hashes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Millisecond timestamp shifted left 16 bits, with a wrapping counter below it
fn generate_id() -> u64 {
    let timestamp = now_ms() as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

/// Current unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Event names used across the crate
pub mod events {
    pub const LOGIN_SUCCEEDED: &str = "login_succeeded";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const ACCESS_DENIED: &str = "access_denied";
    pub const ACCOUNT_CREATED: &str = "account_created";
    pub const ACCOUNT_UPDATED: &str = "account_updated";
    pub const ACCOUNT_DELETED: &str = "account_deleted";
    pub const TRANSFER_COMPLETED: &str = "transfer_completed";
    pub const TRANSFER_REJECTED: &str = "transfer_rejected";
    pub const DEPOSIT_COMPLETED: &str = "deposit_completed";
}

/// An audit event to be recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            account_number: None,
            account_id: None,
            reason: None,
        }
    }

    pub fn with_account_number(mut self, number: i64) -> Self {
        self.account_number = Some(number);
        self
    }

    /// Account id as it appeared in the request path
    pub fn with_account_id(mut self, id: i64) -> Self {
        self.account_id = Some(id);
        self
    }

    /// Why something was refused. Events with a reason count as denials.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// An audit entry as stored in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: u64,
    /// Unix milliseconds
    pub timestamp: i64,
    pub event: String,
    pub account_number: Option<i64>,
    pub account_id: Option<i64>,
    pub reason: Option<String>,
}

/// Aggregate counts for `tally audit stats`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total: u64,
    pub denials: u64,
    pub oldest_timestamp: Option<i64>,
}

pub struct AuditService {
    repository: Arc<DuckDbRepository>,
}

impl AuditService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    pub fn record(&self, event: AuditEvent) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: generate_id(),
            timestamp: now_ms(),
            event: event.event,
            account_number: event.account_number,
            account_id: event.account_id,
            reason: event.reason,
        };
        self.repository.insert_audit_event(&entry)?;
        Ok(entry)
    }

    /// Record without failing the caller. A lost audit row is logged instead.
    pub fn record_quietly(&self, event: AuditEvent) {
        let name = event.event.clone();
        if let Err(e) = self.record(event) {
            warn!(event = %name, "failed to write audit event: {}", e);
        }
    }

    pub fn get_recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.repository.recent_audit_events(limit, false)
    }

    pub fn get_denials(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.repository.recent_audit_events(limit, true)
    }

    pub fn count(&self) -> Result<u64> {
        self.repository.count_audit_events()
    }

    pub fn stats(&self) -> Result<AuditStats> {
        let total = self.count()?;
        let denials = self.repository.count_audit_denials()?;
        let oldest_timestamp = self.repository.oldest_audit_timestamp()?;
        Ok(AuditStats {
            total,
            denials,
            oldest_timestamp,
        })
    }

    /// Delete entries older than the given timestamp (unix ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        self.repository.delete_audit_events_before(timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuditService {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        AuditService::new(Arc::new(repo))
    }

    #[test]
    fn test_record_event() {
        let audit = service();
        audit
            .record(AuditEvent::new(events::LOGIN_SUCCEEDED).with_account_number(10_000_001))
            .unwrap();

        let entries = audit.get_recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "login_succeeded");
        assert_eq!(entries[0].account_number, Some(10_000_001));
        assert_eq!(entries[0].reason, None);
    }

    #[test]
    fn test_denials_are_events_with_a_reason() {
        let audit = service();
        audit.record_quietly(AuditEvent::new(events::ACCOUNT_CREATED).with_account_id(1));
        audit.record_quietly(
            AuditEvent::new(events::ACCESS_DENIED)
                .with_account_id(2)
                .with_account_number(10_000_001)
                .with_reason("account_mismatch"),
        );

        let denials = audit.get_denials(10).unwrap();
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].account_id, Some(2));
        assert_eq!(denials[0].reason.as_deref(), Some("account_mismatch"));

        let stats = audit.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.denials, 1);
        assert!(stats.oldest_timestamp.is_some());
    }

    #[test]
    fn test_ids_are_unique_within_a_millisecond() {
        let ids: std::collections::HashSet<u64> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_count_and_delete() {
        let audit = service();
        audit.record(AuditEvent::new("event1")).unwrap();
        audit.record(AuditEvent::new("event2")).unwrap();
        audit.record(AuditEvent::new("event3")).unwrap();
        assert_eq!(audit.count().unwrap(), 3);

        let deleted = audit.delete_before(now_ms() + 1000).unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(audit.count().unwrap(), 0);
        assert_eq!(audit.stats().unwrap().oldest_timestamp, None);
    }
}
