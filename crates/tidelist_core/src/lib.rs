//! # Tidelist Core
//!
//! Entity model and shared state for the Tidelist sync backend.
//!
//! This crate provides:
//! - Typed identifiers (`EntityId`, `OwnerId`, `DeviceId`)
//! - The three replicated entity kinds (`Space`, `Category`, `Item`)
//! - Partial-patch payloads with explicit present/null/absent fields
//! - The keyed entity stores with conditional writes
//! - The append-only operation log used for idempotency and audit
//! - The per-account device registry

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod devices;
mod entity;
mod error;
mod oplog;
mod patch;
mod store;
mod types;

pub use devices::{DeviceRecord, DeviceRegistry};
pub use entity::{Category, EntityKind, Item, Operation, Priority, Replicated, Space};
pub use error::{CoreError, CoreResult};
pub use oplog::{LogEntry, OperationKey, OperationLog};
pub use patch::{CategoryPatch, Field, ItemPatch, SpacePatch};
pub use store::{EntityStore, PutOutcome, SyncStore};
pub use types::{DeviceId, EntityId, OwnerId, Timestamp};
