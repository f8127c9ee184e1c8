//! Sync request/response messages.

use crate::change::ChangeRecord;
use serde::{Deserialize, Serialize};
use tidelist_core::{Category, DeviceId, Item, Space, Timestamp};

/// A sync request: one batch of changes plus the client's checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncRequest {
    /// Identifier of the submitting device. Required; its absence fails the
    /// whole request.
    pub device_id: Option<DeviceId>,
    /// Checkpoint of the last delta the client received. Absent means "send
    /// everything".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<Timestamp>,
    /// Ordered batch of mutations to apply.
    pub changes: Vec<ChangeRecord>,
}

impl SyncRequest {
    /// Builds a request for one device with no changes.
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(DeviceId::new(device_id)),
            last_sync_timestamp: None,
            changes: Vec::new(),
        }
    }

    /// Sets the checkpoint.
    pub fn since(mut self, timestamp: Timestamp) -> Self {
        self.last_sync_timestamp = Some(timestamp);
        self
    }

    /// Appends a change to the batch.
    pub fn with_change(mut self, change: ChangeRecord) -> Self {
        self.changes.push(change);
        self
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Per-change outcome returned to the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeAck {
    /// Echo of the change's entity identifier.
    pub id: Option<String>,
    /// Echo of the change's entity kind.
    pub entity_kind: Option<String>,
    /// Echo of the change's operation.
    pub operation: Option<String>,
    /// Whether the change was accepted (conflicts and duplicates count as
    /// accepted; they are expected outcomes, not failures).
    pub success: bool,
    /// The stored version was newer; the change was discarded.
    #[serde(skip_serializing_if = "is_false")]
    pub conflict: bool,
    /// The exact operation was already applied by an earlier delivery.
    #[serde(skip_serializing_if = "is_false")]
    pub duplicate: bool,
    /// Failure message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeAck {
    fn echo(change: &ChangeRecord) -> Self {
        Self {
            id: change.id.clone(),
            entity_kind: change.entity_kind.clone(),
            operation: change.operation.clone(),
            success: false,
            conflict: false,
            duplicate: false,
            error: None,
        }
    }

    /// The change was applied.
    pub fn applied(change: &ChangeRecord) -> Self {
        Self {
            success: true,
            ..Self::echo(change)
        }
    }

    /// The change lost conflict resolution; stored state is authoritative.
    pub fn conflict(change: &ChangeRecord) -> Self {
        Self {
            success: true,
            conflict: true,
            ..Self::echo(change)
        }
    }

    /// The change was a duplicate delivery; nothing was mutated.
    pub fn duplicate(change: &ChangeRecord) -> Self {
        Self {
            success: true,
            duplicate: true,
            ..Self::echo(change)
        }
    }

    /// The change failed.
    pub fn failed(change: &ChangeRecord, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::echo(change)
        }
    }
}

/// Entities mutated after the client's checkpoint, tombstones included.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerUpdates {
    /// Spaces to merge.
    pub spaces: Vec<Space>,
    /// Categories to merge.
    pub categories: Vec<Category>,
    /// Items to merge.
    pub items: Vec<Item>,
}

impl ServerUpdates {
    /// Total number of entities in the delta.
    pub fn len(&self) -> usize {
        self.spaces.len() + self.categories.len() + self.items.len()
    }

    /// Returns true if the delta is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Response to a sync request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// One acknowledgement per submitted change, in submission order.
    pub acknowledgements: Vec<ChangeAck>,
    /// Server-side delta the client must merge.
    pub server_updates: ServerUpdates,
    /// Checkpoint to pass as `lastSyncTimestamp` on the next call.
    pub sync_timestamp: Timestamp,
}

/// Response to an initial-load request: the full live entity set, with
/// tombstones excluded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitialLoadResponse {
    /// All live spaces.
    pub spaces: Vec<Space>,
    /// All live categories.
    pub categories: Vec<Category>,
    /// All live items.
    pub items: Vec<Item>,
}
