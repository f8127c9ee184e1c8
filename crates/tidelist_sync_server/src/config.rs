//! Server configuration.

use crate::auth::AuthConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tidelist_sync_engine::EngineConfig;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Secret key for token validation.
    pub auth_secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
    /// Engine tunables.
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr, auth_secret: Vec<u8>) -> Self {
        Self {
            bind_addr,
            auth_secret,
            token_expiry: Duration::from_secs(24 * 60 * 60),
            engine: EngineConfig::default(),
        }
    }

    /// Sets the token expiration duration.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    /// Sets the engine configuration.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Builds the auth configuration for this server.
    pub fn auth(&self) -> AuthConfig {
        AuthConfig::new(self.auth_secret.clone()).with_expiry(self.token_expiry)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)), b"insecure-dev-secret".to_vec())
    }
}
