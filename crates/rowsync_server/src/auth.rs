//! Bearer-token authentication.
//!
//! Tokens bind a user ID to an issue time with HMAC-SHA256 and are
//! hex-encoded for transport in an `Authorization: Bearer` header.
//!
//! ## Token Format
//!
//! - 2 bytes: user ID length (big-endian)
//! - N bytes: user ID (UTF-8)
//! - 8 bytes: issue timestamp (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 over everything above

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use rowsync_store::now_millis;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const LEN_PREFIX: usize = 2;
const TIMESTAMP_LEN: usize = 8;
const SIGNATURE_LEN: usize = 32;

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Default token lifetime.
    pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Self::DEFAULT_EXPIRY,
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}

/// Issues and checks user tokens.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for `user_id`, issued now.
    pub fn create_token(&self, user_id: &str) -> ServerResult<String> {
        self.create_token_at(user_id, now_millis())
    }

    /// Creates a token for `user_id` with an explicit issue time.
    pub fn create_token_at(&self, user_id: &str, issued_at_millis: u64) -> ServerResult<String> {
        let id_len = u16::try_from(user_id.len())
            .map_err(|_| ServerError::InvalidRequest("user ID too long".into()))?;

        let mut data = Vec::with_capacity(LEN_PREFIX + user_id.len() + TIMESTAMP_LEN + SIGNATURE_LEN);
        data.extend_from_slice(&id_len.to_be_bytes());
        data.extend_from_slice(user_id.as_bytes());
        data.extend_from_slice(&issued_at_millis.to_be_bytes());

        let signature = self.sign(&data)?;
        data.extend_from_slice(&signature);
        Ok(hex::encode(data))
    }

    /// Validates a token and returns the user ID it was issued to.
    ///
    /// # Errors
    ///
    /// [`ServerError::NotAuthorized`] if the token is malformed, forged, or expired.
    pub fn validate_token(&self, token: &str) -> ServerResult<String> {
        let raw = hex::decode(token.trim())
            .map_err(|_| ServerError::NotAuthorized("malformed token".into()))?;
        if raw.len() < LEN_PREFIX + TIMESTAMP_LEN + SIGNATURE_LEN {
            return Err(ServerError::NotAuthorized("invalid token length".into()));
        }

        let id_len = usize::from(u16::from_be_bytes([raw[0], raw[1]]));
        let signed_len = LEN_PREFIX + id_len + TIMESTAMP_LEN;
        if raw.len() != signed_len + SIGNATURE_LEN {
            return Err(ServerError::NotAuthorized("invalid token length".into()));
        }

        let (signed, signature) = raw.split_at(signed_len);
        let mut mac = self.mac()?;
        mac.update(signed);
        mac.verify_slice(signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        let mut timestamp = [0u8; TIMESTAMP_LEN];
        timestamp.copy_from_slice(&signed[LEN_PREFIX + id_len..]);
        let issued_at = u64::from_be_bytes(timestamp);
        let expiry_millis = u64::try_from(self.config.token_expiry.as_millis()).unwrap_or(u64::MAX);
        if now_millis() > issued_at.saturating_add(expiry_millis) {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }

        String::from_utf8(signed[LEN_PREFIX..LEN_PREFIX + id_len].to_vec())
            .map_err(|_| ServerError::NotAuthorized("malformed token".into()))
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("HMAC key: {e}")))
    }

    fn sign(&self, data: &[u8]) -> ServerResult<[u8; SIGNATURE_LEN]> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }
}
