//! Client-submitted change records.

use serde::{Deserialize, Serialize};
use tidelist_core::Timestamp;

/// One client-submitted mutation intent for one entity.
///
/// `id`, `entity_kind` and `operation` are kept as raw optional strings: a
/// change missing or misspelling one of them must fail on its own (with a
/// per-change acknowledgement), not poison the batch, so validation is
/// deferred to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeRecord {
    /// Client-minted entity identifier.
    pub id: Option<String>,
    /// Entity kind name (`space`, `category` or `item`).
    pub entity_kind: Option<String>,
    /// Operation name (`create`, `update` or `delete`).
    pub operation: Option<String>,
    /// Kind-specific partial payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Client-declared logical timestamp of the mutation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Client-assigned delivery identifier for duplicate suppression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl ChangeRecord {
    /// Builds a change record with the three mandatory fields set.
    pub fn new(
        id: impl Into<String>,
        entity_kind: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            entity_kind: Some(entity_kind.into()),
            operation: Some(operation.into()),
            data: None,
            timestamp: None,
            operation_id: None,
        }
    }

    /// Attaches a payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches a client-declared timestamp.
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attaches a client-assigned delivery identifier.
    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }
}
