//! Append-only operation log.
//!
//! Every applied mutation is recorded here, once, and never rewritten. The
//! log serves two purposes: duplicate-delivery detection for at-least-once
//! clients, and an audit trail of who changed what. Retention/archival of
//! old entries is an external concern.

use crate::entity::{EntityKind, Operation};
use crate::error::CoreResult;
use crate::types::{DeviceId, EntityId, OwnerId, Timestamp};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;

/// One applied mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Owning account.
    pub owner_id: OwnerId,
    /// Device that submitted the change.
    pub device_id: DeviceId,
    /// Kind of the mutated entity.
    pub entity_kind: EntityKind,
    /// Identifier of the mutated entity.
    pub entity_id: EntityId,
    /// What was done.
    pub operation: Operation,
    /// Snapshot of the payload that was applied.
    pub snapshot: serde_json::Value,
    /// Resolved logical timestamp of the mutation.
    pub timestamp: Timestamp,
    /// Client-assigned delivery identifier, when the client sent one.
    pub operation_id: Option<String>,
}

impl LogEntry {
    /// Returns the duplicate-detection key for this entry.
    pub fn key(&self) -> OperationKey {
        OperationKey::for_change(
            &self.owner_id,
            &self.device_id,
            &self.entity_id,
            self.operation,
            self.timestamp,
            self.operation_id.as_deref(),
        )
    }
}

/// Key identifying one delivery of one operation.
///
/// A client-assigned `operationId` takes precedence; without one the natural
/// key `(device, entity, operation, timestamp)` is used. Both are scoped by
/// the owning account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKey {
    /// Client-assigned delivery identifier.
    Client {
        /// Owning account.
        owner: OwnerId,
        /// The client-assigned identifier.
        operation_id: String,
    },
    /// Natural key for changes without an explicit identifier.
    Natural {
        /// Owning account.
        owner: OwnerId,
        /// Submitting device.
        device: DeviceId,
        /// Target entity.
        entity: EntityId,
        /// Operation kind.
        operation: Operation,
        /// Resolved logical timestamp.
        timestamp: Timestamp,
    },
}

impl OperationKey {
    /// Builds the key for a change, preferring the client identifier.
    pub fn for_change(
        owner: &OwnerId,
        device: &DeviceId,
        entity: &EntityId,
        operation: Operation,
        timestamp: Timestamp,
        operation_id: Option<&str>,
    ) -> Self {
        match operation_id {
            Some(op_id) => OperationKey::Client {
                owner: owner.clone(),
                operation_id: op_id.to_string(),
            },
            None => OperationKey::Natural {
                owner: owner.clone(),
                device: device.clone(),
                entity: entity.clone(),
                operation,
                timestamp,
            },
        }
    }
}

struct LogInner {
    entries: Vec<LogEntry>,
    seen: HashSet<OperationKey>,
}

/// The append-only log of applied mutations.
pub struct OperationLog {
    inner: RwLock<LogInner>,
}

impl OperationLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LogInner {
                entries: Vec::new(),
                seen: HashSet::new(),
            }),
        }
    }

    /// Returns true if an operation with this key was already applied.
    pub fn contains(&self, key: &OperationKey) -> CoreResult<bool> {
        Ok(self.inner.read().seen.contains(key))
    }

    /// Appends an entry and records its duplicate-detection key.
    pub fn append(&self, entry: LogEntry) -> CoreResult<()> {
        let key = entry.key();
        let mut inner = self.inner.write();
        inner.seen.insert(key);
        inner.entries.push(entry);
        Ok(())
    }

    /// Returns all entries for one account, in application order.
    pub fn entries_for(&self, owner: &OwnerId) -> CoreResult<Vec<LogEntry>> {
        Ok(self
            .inner
            .read()
            .entries
            .iter()
            .filter(|e| &e.owner_id == owner)
            .cloned()
            .collect())
    }

    /// Total number of entries across all accounts.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if no entries have been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new()
    }
}
