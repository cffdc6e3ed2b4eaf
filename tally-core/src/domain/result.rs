//! Result and error types for the core library

use thiserror::Error;

/// Why a capability token was rejected
///
/// Callers only ever see a uniform "access denied"; the variant is kept for
/// the audit trail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token algorithm does not match")]
    AlgorithmMismatch,

    #[error("token has expired")]
    Expired,
}

impl TokenError {
    /// Short machine-readable reason for audit entries
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::Malformed => "token_malformed",
            TokenError::SignatureInvalid => "token_signature_invalid",
            TokenError::AlgorithmMismatch => "token_algorithm_mismatch",
            TokenError::Expired => "token_expired",
        }
    }
}

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(#[from] TokenError),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an authorization error
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create a storage-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_error_converts_to_authentication() {
        let err: Error = TokenError::Expired.into();
        assert!(matches!(err, Error::Authentication(TokenError::Expired)));
        assert_eq!(TokenError::Expired.reason(), "token_expired");
    }

    #[test]
    fn test_only_storage_errors_are_retryable() {
        assert!(Error::unavailable("timed out").is_retryable());
        assert!(!Error::InsufficientFunds.is_retryable());
        assert!(!Error::validation("bad input").is_retryable());
    }

    #[test]
    fn test_validation_message() {
        let err = Error::validation("amount must be positive");
        assert_eq!(err.to_string(), "Validation error: amount must be positive");
    }
}
