//! Error types for the sync engine.

use thiserror::Error;
use tidelist_core::{CoreError, EntityId, EntityKind};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while processing a sync request.
///
/// Conflicts and duplicates are deliberately *not* represented here: they
/// are expected outcomes of concurrent offline edits and surface in the
/// per-change acknowledgement instead.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The request carried no device identifier.
    #[error("missing device identifier")]
    MissingDevice,

    /// The change batch exceeds the configured limit.
    #[error("batch too large: {len} changes exceeds limit of {max}")]
    BatchTooLarge {
        /// Number of changes submitted.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// A change was structurally malformed.
    #[error("invalid change: {0}")]
    InvalidChange(String),

    /// A change named an entity kind no store exists for.
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// An update or delete targeted an entity that does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of the missing entity.
        kind: EntityKind,
        /// Identifier of the missing entity.
        id: EntityId,
    },

    /// The core store failed.
    #[error(transparent)]
    Store(#[from] CoreError),
}

impl EngineError {
    /// Returns true if this error aborts the whole request rather than one
    /// change of the batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::MissingDevice | EngineError::BatchTooLarge { .. } | EngineError::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split() {
        assert!(EngineError::MissingDevice.is_fatal());
        assert!(EngineError::BatchTooLarge { len: 501, max: 500 }.is_fatal());
        assert!(EngineError::Store(CoreError::StoreUnavailable("down".into())).is_fatal());

        assert!(!EngineError::InvalidChange("missing id".into()).is_fatal());
        assert!(!EngineError::UnknownEntityKind("folder".into()).is_fatal());
        assert!(!EngineError::NotFound {
            kind: EntityKind::Item,
            id: EntityId::new("i1"),
        }
        .is_fatal());
    }

    #[test]
    fn not_found_display() {
        let err = EngineError::NotFound {
            kind: EntityKind::Space,
            id: EntityId::new("s9"),
        };
        assert_eq!(err.to_string(), "space not found: s9");
    }
}
