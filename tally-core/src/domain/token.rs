//! Capability token claims

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The only signing algorithm the server issues or accepts
pub const TOKEN_ALGORITHM: &str = "HS256";

/// Verified claims of a capability token
///
/// Only produced by a successful `TokenService::verify`; nothing else in the
/// crate builds one from untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub account_number: i64,
    /// Unix seconds
    pub expires_at: i64,
}

impl TokenClaims {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expires_at, 0).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }
}

/// Token header as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenHeader {
    pub alg: String,
    #[serde(default)]
    pub typ: Option<String>,
}

impl TokenHeader {
    pub fn expected() -> Self {
        Self {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let claims = TokenClaims {
            account_number: 10_000_001,
            expires_at: now.timestamp() + 60,
        };
        assert!(!claims.is_expired_at(now));
        assert!(claims.is_expired_at(now + Duration::seconds(60)));
    }
}
