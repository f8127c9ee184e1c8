//! Authentication for the sync server.
//!
//! Bearer tokens are HMAC-SHA256 signed and carry the account identifier
//! plus an issue timestamp for expiration checking.
//!
//! ## Token format
//!
//! `<owner>.<issued-at-millis>.<hex signature>`
//!
//! The signature covers `<owner>.<issued-at-millis>`. Credential issuance
//! (how a user proves who they are in the first place) is an external
//! concern; this module only turns a presented token into an [`OwnerId`]
//! or rejects the request.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tidelist_core::OwnerId;

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration with a 24 hour expiry.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Issues and validates account tokens.
#[derive(Clone)]
pub struct TokenAuthority {
    config: AuthConfig,
}

impl TokenAuthority {
    /// Creates a new token authority.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for an account.
    pub fn issue(&self, owner: &OwnerId) -> String {
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.issue_at(owner, issued_at)
    }

    fn issue_at(&self, owner: &OwnerId, issued_at: u64) -> String {
        let payload = format!("{}.{}", owner, issued_at);
        let signature = self.sign(payload.as_bytes());
        format!("{}.{}", payload, hex(&signature))
    }

    /// Validates a token and returns the account it was issued for.
    pub fn verify(&self, token: &str) -> ServerResult<OwnerId> {
        // The owner id may itself contain dots; split from the right.
        let mut parts = token.rsplitn(3, '.');
        let signature = parts
            .next()
            .ok_or_else(|| ServerError::NotAuthorized("malformed token".into()))?;
        let issued_at = parts
            .next()
            .ok_or_else(|| ServerError::NotAuthorized("malformed token".into()))?;
        let owner = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServerError::NotAuthorized("malformed token".into()))?;

        let payload = format!("{}.{}", owner, issued_at);
        let expected = hex(&self.sign(payload.as_bytes()));
        if signature != expected {
            return Err(ServerError::NotAuthorized("invalid signature".into()));
        }

        let issued_at: u64 = issued_at
            .parse()
            .map_err(|_| ServerError::NotAuthorized("malformed token".into()))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let expiry_millis = self.config.token_expiry.as_millis() as u64;
        if now > issued_at.saturating_add(expiry_millis) {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }

        Ok(OwnerId::new(owner))
    }

    /// Extracts and validates the bearer token of an `Authorization` header
    /// value.
    pub fn authenticate(&self, authorization: Option<&str>) -> ServerResult<OwnerId> {
        let header =
            authorization.ok_or_else(|| ServerError::NotAuthorized("missing token".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServerError::NotAuthorized("expected bearer token".into()))?;
        self.verify(token)
    }

    fn sign(&self, data: &[u8]) -> [u8; 32] {
        let mut mac =
            HmacSha256::new_from_slice(&self.config.secret).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
