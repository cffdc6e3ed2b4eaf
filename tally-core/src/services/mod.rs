//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and store interactions. Each service
//! focuses on one component of the ledger.

pub mod audit;
mod credentials;
mod guard;
mod ledger;
pub mod migration;
mod status;
mod tokens;

pub use audit::{AuditEntry, AuditEvent, AuditService, AuditStats};
pub use credentials::CredentialStore;
pub use guard::{bearer_token, AccessGuard, Denial, LoginGrant};
pub use ledger::LedgerService;
pub use migration::{MigrationResult, MigrationService};
pub use status::{AccountSummary, StatusService, StatusSummary};
pub use tokens::TokenService;
