//! Server configuration.

use crate::auth::AuthConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the sync server.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Maximum number of mutations in one push request.
    pub max_push_batch: usize,
    /// Acknowledge mutations the mutator rejected instead of halting the batch.
    pub skip_failed_mutations: bool,
    /// Bound on cached client view records. `None` keeps every record.
    pub cvr_cache_capacity: Option<usize>,
    /// Whether to require authentication.
    pub require_auth: bool,
    /// Secret key for token validation (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
    /// Lifetime of issued tokens.
    pub token_expiry: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            request_timeout: Duration::from_secs(30),
            max_push_batch: 100,
            skip_failed_mutations: true,
            cvr_cache_capacity: None,
            require_auth: false,
            auth_secret: None,
            token_expiry: AuthConfig::DEFAULT_EXPIRY,
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets whether rejected mutations are skipped.
    pub fn with_skip_failed_mutations(mut self, skip: bool) -> Self {
        self.skip_failed_mutations = skip;
        self
    }

    /// Bounds the CVR cache.
    pub fn with_cvr_cache_capacity(mut self, capacity: usize) -> Self {
        self.cvr_cache_capacity = Some(capacity);
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the token lifetime.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    /// Returns the auth configuration, if authentication is enabled.
    pub fn auth_config(&self) -> Option<AuthConfig> {
        match (&self.auth_secret, self.require_auth) {
            (Some(secret), true) => {
                Some(AuthConfig::new(secret.clone()).with_expiry(self.token_expiry))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("request_timeout", &self.request_timeout)
            .field("max_push_batch", &self.max_push_batch)
            .field("skip_failed_mutations", &self.skip_failed_mutations)
            .field("cvr_cache_capacity", &self.cvr_cache_capacity)
            .field("require_auth", &self.require_auth)
            .field("auth_secret", &self.auth_secret.as_ref().map(|_| "<redacted>"))
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}
