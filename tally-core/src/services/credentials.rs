//! Credential store - password hashing and verification
//!
//! Argon2id with a random salt per hash, stored as a PHC string. Plaintext
//! passwords are only ever borrowed for the duration of a call.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::Rng;

use crate::config::CredentialParams;
use crate::domain::result::{Error, Result};

pub struct CredentialStore {
    argon2: Argon2<'static>,
    /// Verified against when an account does not exist, so a failed login
    /// costs the same whether or not the number is real
    decoy_hash: String,
}

impl CredentialStore {
    pub fn new(params: CredentialParams) -> Result<Self> {
        let argon2_params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| Error::Config(format!("invalid argon2 parameters: {}", e)))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
        let decoy_salt = random_salt()?;
        let decoy_hash = argon2
            .hash_password(decoy_salt.as_str().as_bytes(), &decoy_salt)
            .map_err(|e| Error::Credential(format!("failed to prepare decoy hash: {}", e)))?
            .to_string();

        Ok(Self { argon2, decoy_hash })
    }

    /// Hash a password. Fails only if the hasher cannot get entropy or memory.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = random_salt()?;
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            // The argon2 error never contains the input
            .map_err(|e| Error::Credential(format!("failed to hash password: {}", e)))
    }

    /// Check a password against a stored hash. Malformed hashes verify false.
    pub fn verify(&self, hash: &str, password: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// `verify`, but burns the same work on a decoy when there is no hash
    pub fn verify_or_decoy(&self, hash: Option<&str>, password: &str) -> bool {
        match hash {
            Some(hash) => self.verify(hash, password),
            None => {
                let _ = self.verify(&self.decoy_hash, password);
                false
            }
        }
    }
}

/// 16 random bytes, base64 encoded for the PHC string
fn random_salt() -> Result<SaltString> {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    SaltString::encode_b64(&bytes)
        .map_err(|e| Error::Credential(format!("failed to encode salt: {}", e)))
}

impl CredentialParams {
    /// Smallest work factor argon2 accepts. Only for tests and throwaway data.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: 1,
            parallelism: 1,
        }
    }
}
