//! Access guard - binds a request's bearer token to the account it targets
//!
//! A request gets through only when the token verifies and its account number
//! matches the account addressed by the path. Every refusal looks the same to
//! the caller; the specific reason goes to the audit trail.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result, TokenError};
use crate::domain::Account;
use crate::services::audit::{events, AuditEvent, AuditService};
use crate::services::credentials::CredentialStore;
use crate::services::tokens::TokenService;

const BEARER_PREFIX: &str = "Bearer ";

/// Why a guarded request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    MissingToken,
    Token(TokenError),
    MalformedAccountId,
    AccountNotFound,
    AccountMismatch,
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::MissingToken => "missing_token",
            Denial::Token(err) => err.reason(),
            Denial::MalformedAccountId => "malformed_account_id",
            Denial::AccountNotFound => "account_not_found",
            Denial::AccountMismatch => "account_mismatch",
        }
    }

    fn into_error(self) -> Error {
        match self {
            Denial::Token(err) => Error::Authentication(err),
            other => Error::authorization(other.reason()),
        }
    }
}

/// Result of a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginGrant {
    pub token: String,
    pub number: i64,
}

/// Pick the bearer token out of the request headers
///
/// `Authorization: Bearer <token>` wins; the bare `x-jwt-token` header is
/// accepted for older clients. Blank values count as absent.
pub fn bearer_token<'a>(authorization: Option<&'a str>, legacy: Option<&'a str>) -> Option<&'a str> {
    authorization
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .or(legacy)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub struct AccessGuard {
    repository: Arc<DuckDbRepository>,
    tokens: Arc<TokenService>,
    credentials: Arc<CredentialStore>,
    audit: Arc<AuditService>,
}

impl AccessGuard {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        tokens: Arc<TokenService>,
        credentials: Arc<CredentialStore>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            repository,
            tokens,
            credentials,
            audit,
        }
    }

    /// Admit a request for the account at `raw_id`, or refuse it
    ///
    /// Storage failures are passed through unchanged; they are not denials.
    pub fn authorize(&self, bearer: Option<&str>, raw_id: &str) -> Result<Account> {
        let path_id = raw_id.trim().parse::<i64>().ok();
        match self.check(bearer, path_id) {
            Ok(Ok(account)) => Ok(account),
            Ok(Err((denial, claimed_number))) => {
                warn!(
                    reason = denial.reason(),
                    account_id = ?path_id,
                    "access denied"
                );
                let mut event = AuditEvent::new(events::ACCESS_DENIED).with_reason(denial.reason());
                if let Some(id) = path_id {
                    event = event.with_account_id(id);
                }
                if let Some(number) = claimed_number {
                    event = event.with_account_number(number);
                }
                self.audit.record_quietly(event);
                Err(denial.into_error())
            }
            Err(e) => Err(e),
        }
    }

    /// Outer `Err` is a storage failure; inner `Err` is a denial plus the
    /// account number the token claimed, if it got that far
    fn check(
        &self,
        bearer: Option<&str>,
        path_id: Option<i64>,
    ) -> Result<std::result::Result<Account, (Denial, Option<i64>)>> {
        let Some(token) = bearer else {
            return Ok(Err((Denial::MissingToken, None)));
        };
        let claims = match self.tokens.verify(token) {
            Ok(claims) => claims,
            Err(err) => return Ok(Err((Denial::Token(err), None))),
        };
        let claimed = Some(claims.account_number);

        let Some(id) = path_id else {
            return Ok(Err((Denial::MalformedAccountId, claimed)));
        };
        let Some(account) = self.repository.get_account_by_id(id)? else {
            return Ok(Err((Denial::AccountNotFound, claimed)));
        };
        if account.number != claims.account_number {
            return Ok(Err((Denial::AccountMismatch, claimed)));
        }
        Ok(Ok(account))
    }

    /// Exchange an account number and password for a token
    ///
    /// Unknown numbers and wrong passwords fail identically, and take the
    /// same hashing work.
    pub fn login(&self, number: i64, password: &str) -> Result<LoginGrant> {
        let account = self.repository.get_account_by_number(number)?;
        let verified = self
            .credentials
            .verify_or_decoy(account.as_ref().map(|a| a.credential_hash.as_str()), password);

        match account {
            Some(account) if verified => {
                let token = self.tokens.issue(account.number)?;
                info!(number = account.number, "login succeeded");
                self.audit.record_quietly(
                    AuditEvent::new(events::LOGIN_SUCCEEDED)
                        .with_account_id(account.id)
                        .with_account_number(account.number),
                );
                Ok(LoginGrant {
                    token,
                    number: account.number,
                })
            }
            _ => {
                warn!(number, "login failed");
                self.audit.record_quietly(
                    AuditEvent::new(events::LOGIN_FAILED)
                        .with_account_number(number)
                        .with_reason("invalid_credentials"),
                );
                Err(Error::authorization("invalid credentials"))
            }
        }
    }
}
