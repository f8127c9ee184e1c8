//! Per-request sync orchestration.
//!
//! One sync request walks the phases `Idle → DeviceUpdate → ApplyingChanges
//! → ComputingDelta → Responding` and ends back at `Idle`. Faults during
//! device bookkeeping or delta computation abort the whole request; faults
//! while applying changes are contained to the offending change.

use crate::applier::ChangeApplier;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tidelist_core::{OwnerId, Replicated, SyncStore, Timestamp};
use tidelist_sync_protocol::{
    ChangeAck, InitialLoadResponse, ServerUpdates, SyncRequest, SyncResponse,
};

/// The phase a sync request is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No request in flight.
    Idle,
    /// Upserting the device record.
    DeviceUpdate,
    /// Walking the change batch.
    ApplyingChanges,
    /// Querying entities mutated after the checkpoint.
    ComputingDelta,
    /// Assembling the response.
    Responding,
}

impl SyncPhase {
    /// Returns true if `next` is a legal successor of this phase.
    pub fn can_advance_to(self, next: SyncPhase) -> bool {
        matches!(
            (self, next),
            (SyncPhase::Idle, SyncPhase::DeviceUpdate)
                | (SyncPhase::DeviceUpdate, SyncPhase::ApplyingChanges)
                | (SyncPhase::ApplyingChanges, SyncPhase::ComputingDelta)
                | (SyncPhase::ComputingDelta, SyncPhase::Responding)
                | (SyncPhase::Responding, SyncPhase::Idle)
        )
    }
}

/// Counters across all processed requests.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Requests completed successfully.
    pub requests_completed: u64,
    /// Changes applied (including idempotent re-applies).
    pub changes_applied: u64,
    /// Changes discarded by conflict resolution.
    pub conflicts: u64,
    /// Duplicate deliveries skipped.
    pub duplicates: u64,
    /// Changes that failed per-change validation or lookup.
    pub failed_changes: u64,
    /// Message of the last whole-request failure.
    pub last_error: Option<String>,
}

/// Owns one sync request end-to-end: device bookkeeping, batch application
/// and delta computation.
pub struct SyncOrchestrator {
    store: Arc<SyncStore>,
    applier: ChangeApplier,
    config: EngineConfig,
    stats: RwLock<SyncStats>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator over the given store.
    pub fn new(store: Arc<SyncStore>, config: EngineConfig) -> Self {
        let applier = ChangeApplier::new(Arc::clone(&store), config.clone());
        Self {
            store,
            applier,
            config,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<SyncStore> {
        &self.store
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Processes one sync request for an authenticated account.
    pub fn sync(&self, owner: &OwnerId, request: &SyncRequest) -> EngineResult<SyncResponse> {
        let result = self.run_sync(owner, request);
        match &result {
            Ok(response) => {
                let mut stats = self.stats.write();
                stats.requests_completed += 1;
                for ack in &response.acknowledgements {
                    if ack.duplicate {
                        stats.duplicates += 1;
                    } else if ack.conflict {
                        stats.conflicts += 1;
                    } else if ack.success {
                        stats.changes_applied += 1;
                    } else {
                        stats.failed_changes += 1;
                    }
                }
            }
            Err(err) => {
                self.stats.write().last_error = Some(err.to_string());
            }
        }
        result
    }

    fn run_sync(&self, owner: &OwnerId, request: &SyncRequest) -> EngineResult<SyncResponse> {
        let mut phase = SyncPhase::Idle;

        // Device bookkeeping.
        advance(&mut phase, SyncPhase::DeviceUpdate);
        let device = request
            .device_id
            .clone()
            .ok_or(EngineError::MissingDevice)?;
        if request.changes.len() > self.config.max_batch {
            return Err(EngineError::BatchTooLarge {
                len: request.changes.len(),
                max: self.config.max_batch,
            });
        }
        self.store.devices().touch(owner, &device, Utc::now())?;

        // Change application, strictly in submission order. Later changes
        // may rely on entities created by earlier ones.
        advance(&mut phase, SyncPhase::ApplyingChanges);
        let mut acknowledgements = Vec::with_capacity(request.changes.len());
        for change in &request.changes {
            match self.applier.apply(owner, &device, change, Utc::now()) {
                Ok(outcome) if outcome.duplicate => {
                    acknowledgements.push(ChangeAck::duplicate(change));
                }
                Ok(outcome) if outcome.conflict => {
                    acknowledgements.push(ChangeAck::conflict(change));
                }
                Ok(_) => acknowledgements.push(ChangeAck::applied(change)),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::debug!(%owner, error = %err, "change rejected");
                    acknowledgements.push(ChangeAck::failed(change, err.to_string()));
                }
            }
        }

        // Delta computation.
        advance(&mut phase, SyncPhase::ComputingDelta);
        let since = request
            .last_sync_timestamp
            .unwrap_or(Timestamp::UNIX_EPOCH);
        let server_updates = ServerUpdates {
            spaces: self.store.spaces().modified_since(owner, since)?,
            categories: self.store.categories().modified_since(owner, since)?,
            items: self.store.items().modified_since(owner, since)?,
        };
        let sync_timestamp = checkpoint_for(&server_updates, Utc::now());

        advance(&mut phase, SyncPhase::Responding);
        tracing::info!(
            %owner,
            device = %device,
            changes = request.changes.len(),
            delta = server_updates.len(),
            "sync complete"
        );
        let response = SyncResponse {
            acknowledgements,
            server_updates,
            sync_timestamp,
        };
        advance(&mut phase, SyncPhase::Idle);
        Ok(response)
    }

    /// Returns the full live entity set for a fresh device. Tombstones are
    /// excluded: a device that never had an entity has no use for its
    /// delete marker.
    pub fn initial_load(&self, owner: &OwnerId) -> EngineResult<InitialLoadResponse> {
        Ok(InitialLoadResponse {
            spaces: self.store.spaces().live(owner)?,
            categories: self.store.categories().live(owner)?,
            items: self.store.items().live(owner)?,
        })
    }
}

fn advance(phase: &mut SyncPhase, next: SyncPhase) {
    debug_assert!(phase.can_advance_to(next), "illegal transition {phase:?} -> {next:?}");
    *phase = next;
}

/// Picks the checkpoint returned to the client: never older than any
/// `updated_at` in the delta, so a client resuming with strict `>` cannot
/// re-receive this batch.
fn checkpoint_for(updates: &ServerUpdates, now: Timestamp) -> Timestamp {
    let newest = updates
        .spaces
        .iter()
        .map(|s| s.updated_at())
        .chain(updates.categories.iter().map(|c| c.updated_at()))
        .chain(updates.items.iter().map(|i| i.updated_at()))
        .max();
    match newest {
        Some(ts) if ts > now => ts,
        _ => now,
    }
}
