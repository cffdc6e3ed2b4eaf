//! Token service - issue and verify signed capability tokens
//!
//! Tokens use the JWT compact form: `base64url(header).base64url(claims).base64url(mac)`
//! with HMAC-SHA256 over the first two segments. The header's `alg` is checked
//! against the single configured algorithm before the secret is touched, so a
//! token cannot pick its own verification method.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::{Config, SigningSecret};
use crate::domain::result::{Error, Result, TokenError};
use crate::domain::{TokenClaims, TokenHeader, TOKEN_ALGORITHM};

type HmacSha256 = Hmac<Sha256>;

pub struct TokenService {
    secret: SigningSecret,
    ttl: chrono::Duration,
}

impl TokenService {
    pub fn new(secret: SigningSecret, ttl: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Config("signing secret cannot be empty".into()));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| Error::Config("token TTL is out of range".into()))?;
        if ttl <= chrono::Duration::zero() {
            return Err(Error::Config("token TTL must be greater than zero".into()));
        }
        Ok(Self { secret, ttl })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.jwt_secret.clone(), config.token_ttl)
    }

    /// Issue a token for an account number, expiring one TTL from now
    pub fn issue(&self, account_number: i64) -> Result<String> {
        self.issue_at(account_number, Utc::now())
    }

    pub fn issue_at(&self, account_number: i64, now: DateTime<Utc>) -> Result<String> {
        let claims = TokenClaims {
            account_number,
            expires_at: (now + self.ttl).timestamp(),
        };

        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&TokenHeader::expected())?);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{}.{}", header, payload);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes()));

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Verify a token and return its claims
    pub fn verify(&self, token: &str) -> std::result::Result<TokenClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<TokenClaims, TokenError> {
        let mut segments = token.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(TokenError::Malformed),
            };

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(TokenError::AlgorithmMismatch);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;
        let signing_input_len = header_b64.len() + 1 + payload_b64.len();
        let signing_input = &token.as_bytes()[..signing_input_len];

        let mut mac = self.mac();
        mac.update(signing_input);
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::SignatureInvalid)?;

        let claims: TokenClaims = decode_segment(payload_b64)?;
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn sign(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length; emptiness is rejected in `new`
        match HmacSha256::new_from_slice(self.secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
        }
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
) -> std::result::Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
