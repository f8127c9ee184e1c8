//! # Tidelist Sync Protocol
//!
//! Wire types for the Tidelist sync protocol.
//!
//! This crate provides:
//! - `ChangeRecord` for client-submitted mutations
//! - Sync request/response messages and per-change acknowledgements
//! - The initial-load response
//!
//! This is a pure protocol crate with no I/O operations. Payload `data`,
//! `entityKind` and `operation` cross the wire untyped and are validated by
//! the sync engine, so one malformed change fails alone instead of failing
//! the whole request at the deserialization boundary.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod messages;

pub use change::ChangeRecord;
pub use messages::{ChangeAck, InitialLoadResponse, ServerUpdates, SyncRequest, SyncResponse};
