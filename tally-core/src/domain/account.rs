//! Account domain model

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Smallest account number handed out (8 digits)
pub const MIN_ACCOUNT_NUMBER: i64 = 10_000_000;
/// Largest account number handed out
pub const MAX_ACCOUNT_NUMBER: i64 = 99_999_999;

/// A ledger account
///
/// `id` is the store's internal key and addresses the account in request
/// paths. `number` is the public identifier carried in tokens and used as the
/// destination of transfers. Balances are minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub number: i64,
    pub first_name: String,
    pub last_name: String,
    pub balance: i64,
    /// Argon2 PHC string; never leaves the process
    #[serde(skip_serializing, default)]
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Display name used by the CLI
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Registration data, already hashed, waiting for an id and number
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub credential_hash: String,
}

impl NewAccount {
    /// Validate names before anything touches the store
    pub fn validate_names(first_name: &str, last_name: &str) -> Result<(), &'static str> {
        if first_name.trim().is_empty() {
            return Err("first name cannot be empty");
        }
        if last_name.trim().is_empty() {
            return Err("last name cannot be empty");
        }
        if first_name.len() > 100 || last_name.len() > 100 {
            return Err("names are limited to 100 characters");
        }
        Ok(())
    }
}

/// Mutable fields of an account. Balance and number are deliberately absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none()
    }
}

/// A single transfer request, alive only for the duration of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferIntent {
    pub source_account_id: i64,
    pub destination_account_number: i64,
    pub amount: i64,
}

/// Balance view returned to the account that initiated a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReceipt {
    pub number: i64,
    pub balance: i64,
}

/// Draw a candidate account number. Uniqueness is enforced by the store.
pub fn generate_account_number() -> i64 {
    rand::thread_rng().gen_range(MIN_ACCOUNT_NUMBER..=MAX_ACCOUNT_NUMBER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Account {
        Account {
            id: 1,
            number: 12_345_678,
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            balance: 100,
            credential_hash: "$argon2id$v=19$secret".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_credential_hash_is_never_serialized() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("credentialHash").is_none());
        assert_eq!(json["firstName"], "Ann");
        assert_eq!(json["number"], 12_345_678);
    }

    #[test]
    fn test_name_validation() {
        assert!(NewAccount::validate_names("Ann", "Lee").is_ok());
        assert!(NewAccount::validate_names("  ", "Lee").is_err());
        assert!(NewAccount::validate_names("Ann", "").is_err());
        assert!(NewAccount::validate_names(&"x".repeat(101), "Lee").is_err());
    }

    #[test]
    fn test_generated_numbers_stay_in_range() {
        for _ in 0..100 {
            let n = generate_account_number();
            assert!((MIN_ACCOUNT_NUMBER..=MAX_ACCOUNT_NUMBER).contains(&n));
        }
    }
}
