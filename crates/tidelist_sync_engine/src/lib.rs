//! # Tidelist Sync Engine
//!
//! The delta synchronization engine: accepts a batch of client-originated
//! mutations, applies them idempotently against server state, resolves
//! conflicting concurrent writes last-write-wins, and computes the
//! incremental delta the client must merge back.
//!
//! This crate provides:
//! - `ChangeApplier` for the per-change pipeline (validate → idempotency →
//!   conflict check → store write → log write)
//! - `ReferenceResolver` for parent-reference checks
//! - `LastWriteWins` conflict policy
//! - `SyncOrchestrator`, the per-request state machine

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod conflict;
mod error;
mod orchestrator;
mod resolver;

pub use applier::{ChangeApplier, ChangeOutcome};
pub use config::EngineConfig;
pub use conflict::{ConflictDecision, LastWriteWins};
pub use error::{EngineError, EngineResult};
pub use orchestrator::{SyncOrchestrator, SyncPhase, SyncStats};
pub use resolver::ReferenceResolver;
