//! Keyed entity storage with conditional writes.
//!
//! One [`EntityStore`] holds all versions of one entity kind, keyed by
//! `(owner, id)`. Every mutation is scoped by the owning account. The write
//! path is a conditional put: the caller's acceptance predicate runs against
//! the currently stored version *inside* the write lock, so two concurrent
//! writers can never both observe the same stale version and both win.

use crate::devices::DeviceRegistry;
use crate::entity::{Category, Item, Replicated, Space};
use crate::error::CoreResult;
use crate::oplog::OperationLog;
use crate::types::{EntityId, OwnerId, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The write was accepted and is now the stored version.
    Stored,
    /// The stored version was newer; nothing was written.
    Stale,
}

/// In-memory store for one entity kind.
pub struct EntityStore<T: Replicated> {
    rows: RwLock<HashMap<(OwnerId, EntityId), T>>,
}

impl<T: Replicated> EntityStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the stored version of an entity, tombstoned or not.
    pub fn get(&self, owner: &OwnerId, id: &EntityId) -> CoreResult<Option<T>> {
        Ok(self
            .rows
            .read()
            .get(&(owner.clone(), id.clone()))
            .cloned())
    }

    /// Returns true if a live (non-tombstoned) version exists.
    pub fn contains_live(&self, owner: &OwnerId, id: &EntityId) -> CoreResult<bool> {
        Ok(self
            .rows
            .read()
            .get(&(owner.clone(), id.clone()))
            .map(|e| e.is_live())
            .unwrap_or(false))
    }

    /// Inserts a new entity unless one with the same id already exists for
    /// the account. Returns true if the insert happened.
    pub fn insert_if_absent(&self, entity: T) -> CoreResult<bool> {
        let key = (entity.owner().clone(), entity.id().clone());
        let mut rows = self.rows.write();
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, entity);
        Ok(true)
    }

    /// Conditionally replaces the stored version.
    ///
    /// `accept` is evaluated against the currently stored version while the
    /// write lock is held; if it returns false the write is rejected as
    /// stale. A missing stored version always accepts.
    pub fn compare_and_put(
        &self,
        entity: T,
        accept: impl FnOnce(&T) -> bool,
    ) -> CoreResult<PutOutcome> {
        let key = (entity.owner().clone(), entity.id().clone());
        let mut rows = self.rows.write();
        if let Some(stored) = rows.get(&key) {
            if !accept(stored) {
                return Ok(PutOutcome::Stale);
            }
        }
        rows.insert(key, entity);
        Ok(PutOutcome::Stored)
    }

    /// Returns every entity of the account mutated strictly after `since`,
    /// tombstones included, ordered by `updated_at` then id.
    pub fn modified_since(&self, owner: &OwnerId, since: Timestamp) -> CoreResult<Vec<T>> {
        let rows = self.rows.read();
        let mut out: Vec<T> = rows
            .iter()
            .filter(|((o, _), e)| o == owner && e.updated_at() > since)
            .map(|(_, e)| e.clone())
            .collect();
        out.sort_by(|a, b| {
            a.updated_at()
                .cmp(&b.updated_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(out)
    }

    /// Returns every live entity of the account, ordered by id.
    pub fn live(&self, owner: &OwnerId) -> CoreResult<Vec<T>> {
        let rows = self.rows.read();
        let mut out: Vec<T> = rows
            .iter()
            .filter(|((o, _), e)| o == owner && e.is_live())
            .map(|(_, e)| e.clone())
            .collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(out)
    }

    /// Returns `(total, live)` counts for the account.
    pub fn counts(&self, owner: &OwnerId) -> CoreResult<(usize, usize)> {
        let rows = self.rows.read();
        let mut total = 0;
        let mut live = 0;
        for ((o, _), e) in rows.iter() {
            if o == owner {
                total += 1;
                if e.is_live() {
                    live += 1;
                }
            }
        }
        Ok((total, live))
    }
}

impl<T: Replicated> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state the sync engine operates on: the three entity stores, the
/// operation log and the device registry.
///
/// Mutations for one account are serialized through [`SyncStore::owner_lock`]
/// so that the entity write and the matching log append of one change form a
/// single atomic unit. Distinct accounts never contend.
pub struct SyncStore {
    spaces: EntityStore<Space>,
    categories: EntityStore<Category>,
    items: EntityStore<Item>,
    log: OperationLog,
    devices: DeviceRegistry,
    apply_locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl SyncStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            spaces: EntityStore::new(),
            categories: EntityStore::new(),
            items: EntityStore::new(),
            log: OperationLog::new(),
            devices: DeviceRegistry::new(),
            apply_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The space store.
    pub fn spaces(&self) -> &EntityStore<Space> {
        &self.spaces
    }

    /// The category store.
    pub fn categories(&self) -> &EntityStore<Category> {
        &self.categories
    }

    /// The item store.
    pub fn items(&self) -> &EntityStore<Item> {
        &self.items
    }

    /// The append-only operation log.
    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    /// The per-account device registry.
    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    /// Returns the apply lock for one account. Holding it makes an entity
    /// write plus its log append atomic with respect to other requests of
    /// the same account.
    pub fn owner_lock(&self, owner: &OwnerId) -> Arc<Mutex<()>> {
        let mut locks = self.apply_locks.lock();
        Arc::clone(locks.entry(owner.clone()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new()
    }
}
