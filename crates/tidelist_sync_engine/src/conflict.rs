//! Conflict resolution between concurrent writes.

use tidelist_core::Timestamp;

/// Decision for one incoming write against the stored version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    /// The incoming write supersedes the stored version.
    Accept,
    /// The stored version is authoritative; the incoming write is discarded.
    Reject,
}

/// Last-write-wins by logical timestamp, at whole-entity granularity.
///
/// The incoming change wins iff its timestamp is greater than or equal to
/// the stored `updated_at`. Equal timestamps favor the incoming change, so
/// ties break toward the most recently processed write. No field-level merge
/// is attempted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl LastWriteWins {
    /// Decides whether an incoming write supersedes the stored version.
    pub fn decide(&self, incoming: Timestamp, stored: Timestamp) -> ConflictDecision {
        if incoming >= stored {
            ConflictDecision::Accept
        } else {
            ConflictDecision::Reject
        }
    }

    /// Shorthand for `decide(..) == Accept`.
    pub fn accepts(&self, incoming: Timestamp, stored: Timestamp) -> bool {
        self.decide(incoming, stored) == ConflictDecision::Accept
    }
}
