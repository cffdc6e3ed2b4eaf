//! Tally Core - accounts, capability tokens and atomic transfers
//!
//! This crate implements the ledger service's core logic:
//!
//! - **domain**: Core entities (Account, TokenClaims, errors)
//! - **services**: Credential store, token service, access guard, ledger engine
//! - **adapters**: DuckDB-backed relational store
//! - **api**: HTTP transport (axum router and guard middleware)

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, Result, TokenError};
pub use domain::{Account, AccountUpdate, BalanceReceipt, TokenClaims, TransferIntent};

/// Main context for Tally operations
///
/// Holds the store, the immutable configuration and every service. Built once
/// per process; the HTTP layer and the CLI both work through it.
pub struct TallyContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub credential_store: Arc<CredentialStore>,
    pub token_service: Arc<TokenService>,
    pub audit_service: Arc<AuditService>,
    pub guard: Arc<AccessGuard>,
    pub ledger_service: Arc<LedgerService>,
    pub status_service: StatusService,
}

impl TallyContext {
    /// Load configuration from the data directory and open the store
    pub fn new(tally_dir: &Path) -> Result<Self> {
        let config = Config::load(tally_dir)?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let repository = Arc::new(DuckDbRepository::new(&config.database_path)?);
        repository.ensure_schema()?;

        let credential_store = Arc::new(CredentialStore::new(config.credentials)?);
        let token_service = Arc::new(TokenService::from_config(&config)?);
        let audit_service = Arc::new(AuditService::new(Arc::clone(&repository)));
        let guard = Arc::new(AccessGuard::new(
            Arc::clone(&repository),
            Arc::clone(&token_service),
            Arc::clone(&credential_store),
            Arc::clone(&audit_service),
        ));
        let ledger_service = Arc::new(LedgerService::new(
            Arc::clone(&repository),
            Arc::clone(&credential_store),
            Arc::clone(&audit_service),
        ));
        let status_service = StatusService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            repository,
            credential_store,
            token_service,
            audit_service,
            guard,
            ledger_service,
            status_service,
        })
    }

    /// Shared state for the HTTP router
    pub fn service_state(&self) -> api::ServiceState {
        api::ServiceState {
            ledger: Arc::clone(&self.ledger_service),
            guard: Arc::clone(&self.guard),
            store_timeout: self.config.store_timeout,
        }
    }
}
