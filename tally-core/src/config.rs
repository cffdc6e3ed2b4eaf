//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "server": { "listenAddr": "127.0.0.1:3000" },
//!   "auth": { "jwtSecret": "...", "tokenTtlSecs": 3600 },
//!   "store": { "databaseFile": "tally.duckdb", "timeoutMs": 5000 },
//!   "credentials": { "memoryKib": 19456, "iterations": 2, "parallelism": 1 }
//! }
//! ```
//!
//! Environment variables override the file. The resulting `Config` is built
//! once at startup and handed to constructors; services never read the
//! environment themselves.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_DATABASE_FILE: &str = "tally.duckdb";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Argon2id defaults (the argon2 crate's recommended parameters)
pub const DEFAULT_ARGON2_MEMORY_KIB: u32 = 19_456;
pub const DEFAULT_ARGON2_ITERATIONS: u32 = 2;
pub const DEFAULT_ARGON2_PARALLELISM: u32 = 1;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    server: ServerSettings,
    #[serde(default)]
    auth: AuthSettings,
    #[serde(default)]
    store: StoreSettings,
    #[serde(default)]
    credentials: CredentialParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerSettings {
    #[serde(default)]
    listen_addr: Option<String>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthSettings {
    #[serde(default)]
    jwt_secret: Option<String>,
    #[serde(default)]
    token_ttl_secs: Option<u64>,
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreSettings {
    #[serde(default)]
    database_file: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Argon2id work factor. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for CredentialParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_ARGON2_MEMORY_KIB,
            iterations: DEFAULT_ARGON2_ITERATIONS,
            parallelism: DEFAULT_ARGON2_PARALLELISM,
        }
    }
}

/// Server-held token signing secret
///
/// Debug output is redacted so the secret cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    /// Generate a random 256-bit secret, base64 encoded for settings.json
    pub fn generate_encoded() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret(<{} bytes>)", self.0.len())
    }
}

/// Tally configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub database_path: PathBuf,
    pub jwt_secret: SigningSecret,
    pub token_ttl: Duration,
    pub store_timeout: Duration,
    pub credentials: CredentialParams,
}

impl Config {
    /// Build a config rooted at `data_dir` with defaults and the given secret
    pub fn with_secret(data_dir: &Path, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            database_path: data_dir.join(DEFAULT_DATABASE_FILE),
            jwt_secret: SigningSecret::new(secret),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            credentials: CredentialParams::default(),
        }
    }

    /// Load config from the data directory
    ///
    /// Overrides, in order of precedence:
    /// 1. `TALLY_JWT_SECRET`, `TALLY_LISTEN_ADDR`, `TALLY_TOKEN_TTL_SECS`,
    ///    `TALLY_STORE_TIMEOUT_MS`
    /// 2. settings.json
    /// 3. built-in defaults
    pub fn load(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(data_dir)?;

        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let jwt_secret = env("TALLY_JWT_SECRET")
            .or(raw.auth.jwt_secret)
            .unwrap_or_default();
        let listen_addr = env("TALLY_LISTEN_ADDR")
            .or(raw.server.listen_addr)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let token_ttl_secs = match env("TALLY_TOKEN_TTL_SECS") {
            Some(v) => parse_number("TALLY_TOKEN_TTL_SECS", &v)?,
            None => raw.auth.token_ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS),
        };
        let store_timeout_ms = match env("TALLY_STORE_TIMEOUT_MS") {
            Some(v) => parse_number("TALLY_STORE_TIMEOUT_MS", &v)?,
            None => raw.store.timeout_ms.unwrap_or(DEFAULT_STORE_TIMEOUT_MS),
        };
        let database_file = raw
            .store
            .database_file
            .unwrap_or_else(|| DEFAULT_DATABASE_FILE.to_string());

        Ok(Self {
            listen_addr,
            database_path: data_dir.join(database_file),
            jwt_secret: SigningSecret::new(jwt_secret),
            token_ttl: Duration::from_secs(token_ttl_secs),
            store_timeout: Duration::from_millis(store_timeout_ms),
            credentials: raw.credentials,
        })
    }

    /// Reject configurations the server cannot safely start with
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.is_empty() {
            return Err(Error::Config(
                "no signing secret configured; set TALLY_JWT_SECRET or run `tally init`".into(),
            ));
        }
        if self.token_ttl.is_zero() {
            return Err(Error::Config("token TTL must be greater than zero".into()));
        }
        if self.store_timeout.is_zero() {
            return Err(Error::Config("store timeout must be greater than zero".into()));
        }
        if self.credentials.memory_kib == 0
            || self.credentials.iterations == 0
            || self.credentials.parallelism == 0
        {
            return Err(Error::Config("credential parameters must be non-zero".into()));
        }
        Ok(())
    }

    /// Write a fresh signing secret into settings.json
    ///
    /// Preserves the other settings. Rotating the secret invalidates every
    /// token issued so far.
    pub fn write_new_secret(data_dir: &Path) -> Result<()> {
        let mut settings = read_settings(data_dir)?;
        settings.auth.jwt_secret = Some(SigningSecret::generate_encoded());

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid {}: {}", SETTINGS_FILE, e)))
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a positive integer", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempdir().unwrap();
        let config = Config::with_secret(dir.path(), "s3cret");
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.database_path, dir.path().join(DEFAULT_DATABASE_FILE));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_reads_settings_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{
                "server": { "listenAddr": "0.0.0.0:8080" },
                "auth": { "jwtSecret": "from-file", "tokenTtlSecs": 120 },
                "store": { "databaseFile": "ledger.duckdb", "timeoutMs": 250 }
            }"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.database_path, dir.path().join("ledger.duckdb"));
        assert_eq!(config.credentials, CredentialParams::default());
        // The env may override these in CI, so only assert file-only fields strictly
        if std::env::var("TALLY_TOKEN_TTL_SECS").is_err() {
            assert_eq!(config.token_ttl, Duration::from_secs(120));
        }
        if std::env::var("TALLY_STORE_TIMEOUT_MS").is_err() {
            assert_eq!(config.store_timeout, Duration::from_millis(250));
        }
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let dir = tempdir().unwrap();
        let config = Config::with_secret(dir.path(), Vec::new());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_settings_file_is_a_config_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ not json").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_write_new_secret_preserves_other_settings() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "store": { "databaseFile": "keep.duckdb" } }"#,
        )
        .unwrap();

        Config::write_new_secret(dir.path()).unwrap();

        let raw = read_settings(dir.path()).unwrap();
        assert_eq!(raw.store.database_file.as_deref(), Some("keep.duckdb"));
        assert!(raw.auth.jwt_secret.map(|s| !s.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SigningSecret::new("top-secret-value");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("top-secret-value"));
    }
}
