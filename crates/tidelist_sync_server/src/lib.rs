//! # Tidelist Sync Server
//!
//! HTTP sync server for Tidelist.
//!
//! This crate provides:
//! - The protocol surface: `POST /sync` and `GET /sync/initial`
//! - A read-only debug/listing surface (`/spaces`, `/categories`, `/items`,
//!   `/debug/stats`)
//! - Bearer-token authentication (HMAC-SHA256)
//!
//! # Protocol
//!
//! A client submits `(deviceId, lastSyncTimestamp?, changes[])` to `/sync`
//! and receives one acknowledgement per change plus the server-side delta
//! since its checkpoint. A fresh device bootstraps with `/sync/initial`,
//! which returns the live entity set without tombstones.
//!
//! # Authentication
//!
//! ```rust
//! use tidelist_core::OwnerId;
//! use tidelist_sync_server::{AuthConfig, TokenAuthority};
//!
//! let authority = TokenAuthority::new(AuthConfig::new(b"secret".to_vec()));
//! let token = authority.issue(&OwnerId::new("user-1"));
//! assert!(authority.verify(&token).is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod error;
mod routes;
mod server;

pub use auth::{AuthConfig, TokenAuthority};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use routes::{router, AppState};
pub use server::{serve, serve_with_state};
