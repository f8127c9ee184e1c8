//! Per-change application pipeline.
//!
//! One change runs through validation → idempotency check → dispatch. Every
//! step is a hard precondition for the next. A failure here is contained to
//! the change: the orchestrator folds it into that change's acknowledgement
//! and the rest of the batch proceeds.

use crate::config::EngineConfig;
use crate::conflict::LastWriteWins;
use crate::error::{EngineError, EngineResult};
use crate::resolver::ReferenceResolver;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tidelist_core::{
    Category, CategoryPatch, CoreError, DeviceId, EntityId, EntityKind, EntityStore, Item,
    ItemPatch, LogEntry, Operation, OperationKey, OwnerId, PutOutcome, Replicated, Space,
    SpacePatch, SyncStore, Timestamp,
};
use tidelist_sync_protocol::ChangeRecord;

/// Result of applying one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOutcome {
    /// Identifier of the target entity.
    pub entity_id: EntityId,
    /// The change lost conflict resolution and was discarded.
    pub conflict: bool,
    /// The change was a duplicate delivery and was skipped.
    pub duplicate: bool,
}

impl ChangeOutcome {
    fn applied(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            conflict: false,
            duplicate: false,
        }
    }

    fn conflict(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            conflict: true,
            duplicate: false,
        }
    }

    fn duplicate(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            conflict: false,
            duplicate: true,
        }
    }
}

/// Applies one validated change against the store.
pub struct ChangeApplier {
    store: Arc<SyncStore>,
    policy: LastWriteWins,
    config: EngineConfig,
}

impl ChangeApplier {
    /// Creates an applier over the given store.
    pub fn new(store: Arc<SyncStore>, config: EngineConfig) -> Self {
        Self {
            store,
            policy: LastWriteWins,
            config,
        }
    }

    /// Runs the full pipeline for one change.
    ///
    /// `now` is the server-observed time used to resolve the change's
    /// logical timestamp: a missing client timestamp resolves to `now`, and
    /// one further than the configured tolerance ahead of `now` is clamped
    /// back to it.
    pub fn apply(
        &self,
        owner: &OwnerId,
        device: &DeviceId,
        change: &ChangeRecord,
        now: Timestamp,
    ) -> EngineResult<ChangeOutcome> {
        // Step 1: structural validation.
        let kind_name = change
            .entity_kind
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::InvalidChange("missing entityKind".into()))?;
        let kind = EntityKind::parse(kind_name)
            .ok_or_else(|| EngineError::UnknownEntityKind(kind_name.to_string()))?;

        let op_name = change
            .operation
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::InvalidChange("missing operation".into()))?;
        let operation = Operation::parse(op_name).ok_or_else(|| {
            EngineError::InvalidChange(format!("unknown operation: {op_name}"))
        })?;

        let entity_id = change
            .id
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(EntityId::from)
            .ok_or_else(|| EngineError::InvalidChange("missing id".into()))?;

        let timestamp = self.resolve_timestamp(change.timestamp, now);

        // The entity write and its log append must land together; the
        // per-owner lock is the transaction boundary.
        let lock = self.store.owner_lock(owner);
        let _guard = lock.lock();

        // Step 2: idempotency check.
        let key = OperationKey::for_change(
            owner,
            device,
            &entity_id,
            operation,
            timestamp,
            change.operation_id.as_deref(),
        );
        if self.store.log().contains(&key)? {
            tracing::debug!(%owner, entity = %entity_id, op = %operation, "duplicate delivery skipped");
            return Ok(ChangeOutcome::duplicate(entity_id));
        }

        // Step 3: dispatch by kind and operation.
        let ctx = ApplyContext {
            owner,
            device,
            entity_id,
            operation,
            timestamp,
            operation_id: change.operation_id.as_deref(),
            data: change.data.as_ref(),
        };
        match kind {
            EntityKind::Space => self.dispatch::<Space>(ctx),
            EntityKind::Category => self.dispatch::<Category>(ctx),
            EntityKind::Item => self.dispatch::<Item>(ctx),
        }
    }

    fn resolve_timestamp(&self, declared: Option<Timestamp>, now: Timestamp) -> Timestamp {
        match declared {
            Some(ts) if ts > now + self.config.clock_skew_tolerance => {
                tracing::warn!(declared = %ts, "client timestamp too far ahead, clamping to server time");
                now
            }
            Some(ts) => ts,
            None => now,
        }
    }

    fn dispatch<T: Syncable>(&self, ctx: ApplyContext<'_>) -> EngineResult<ChangeOutcome> {
        let patch: T::Patch = match ctx.data {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| EngineError::InvalidChange(format!("malformed payload: {e}")))?,
            None => T::Patch::default(),
        };

        let store = T::store_of(&self.store);
        match ctx.operation {
            Operation::Create => self.apply_create::<T>(ctx, store, patch),
            Operation::Update => self.apply_update::<T>(ctx, store, patch),
            Operation::Delete => self.apply_delete::<T>(ctx, store),
        }
    }

    fn apply_create<T: Syncable>(
        &self,
        ctx: ApplyContext<'_>,
        store: &EntityStore<T>,
        mut patch: T::Patch,
    ) -> EngineResult<ChangeOutcome> {
        // An entity with this id already exists: the create was already
        // applied (possibly via another device). Idempotent success.
        if store.get(ctx.owner, &ctx.entity_id)?.is_some() {
            return Ok(ChangeOutcome::applied(ctx.entity_id));
        }

        let resolver = ReferenceResolver::new(&self.store);
        T::resolve_refs(&mut patch, ctx.owner, &resolver)?;

        let snapshot = serde_json::to_value(&patch).map_err(CoreError::from)?;
        let entity = T::build(
            ctx.entity_id.clone(),
            ctx.owner.clone(),
            ctx.device.clone(),
            ctx.timestamp,
            patch,
        );
        if store.insert_if_absent(entity)? {
            self.append_log(&ctx, T::KIND, snapshot)?;
        }
        Ok(ChangeOutcome::applied(ctx.entity_id))
    }

    fn apply_update<T: Syncable>(
        &self,
        ctx: ApplyContext<'_>,
        store: &EntityStore<T>,
        mut patch: T::Patch,
    ) -> EngineResult<ChangeOutcome> {
        let Some(mut stored) = store.get(ctx.owner, &ctx.entity_id)? else {
            return Err(EngineError::NotFound {
                kind: T::KIND,
                id: ctx.entity_id,
            });
        };

        if !self.policy.accepts(ctx.timestamp, stored.updated_at()) {
            tracing::debug!(entity = %ctx.entity_id, "stale update discarded");
            return Ok(ChangeOutcome::conflict(ctx.entity_id));
        }

        let resolver = ReferenceResolver::new(&self.store);
        T::resolve_refs(&mut patch, ctx.owner, &resolver)?;

        let snapshot = serde_json::to_value(&patch).map_err(CoreError::from)?;
        stored.merge_patch(patch, ctx.timestamp, ctx.device.clone());

        // Conditional write: the policy re-runs against the stored version
        // inside the store's write lock, so a concurrent winner cannot be
        // overwritten by this (now stale) read.
        let timestamp = ctx.timestamp;
        let policy = self.policy;
        match store.compare_and_put(stored, move |current| {
            policy.accepts(timestamp, current.updated_at())
        })? {
            PutOutcome::Stored => {
                self.append_log(&ctx, T::KIND, snapshot)?;
                Ok(ChangeOutcome::applied(ctx.entity_id))
            }
            PutOutcome::Stale => Ok(ChangeOutcome::conflict(ctx.entity_id)),
        }
    }

    fn apply_delete<T: Syncable>(
        &self,
        ctx: ApplyContext<'_>,
        store: &EntityStore<T>,
    ) -> EngineResult<ChangeOutcome> {
        // Missing or already-tombstoned entities are already deleted:
        // idempotent success with no mutation.
        let Some(mut stored) = store.get(ctx.owner, &ctx.entity_id)? else {
            return Ok(ChangeOutcome::applied(ctx.entity_id));
        };
        if stored.deleted_at().is_some() {
            return Ok(ChangeOutcome::applied(ctx.entity_id));
        }

        stored.tombstone_at(ctx.timestamp, ctx.device.clone());
        store.compare_and_put(stored, |_| true)?;
        self.append_log(&ctx, T::KIND, json!({ "deletedAt": ctx.timestamp }))?;
        Ok(ChangeOutcome::applied(ctx.entity_id))
    }

    fn append_log(
        &self,
        ctx: &ApplyContext<'_>,
        kind: EntityKind,
        snapshot: serde_json::Value,
    ) -> EngineResult<()> {
        self.store.log().append(LogEntry {
            owner_id: ctx.owner.clone(),
            device_id: ctx.device.clone(),
            entity_kind: kind,
            entity_id: ctx.entity_id.clone(),
            operation: ctx.operation,
            snapshot,
            timestamp: ctx.timestamp,
            operation_id: ctx.operation_id.map(String::from),
        })?;
        Ok(())
    }
}

struct ApplyContext<'a> {
    owner: &'a OwnerId,
    device: &'a DeviceId,
    entity_id: EntityId,
    operation: Operation,
    timestamp: Timestamp,
    operation_id: Option<&'a str>,
    data: Option<&'a serde_json::Value>,
}

/// The per-kind hooks the generic pipeline needs.
trait Syncable: Replicated + Sized {
    /// Partial payload type for this kind.
    type Patch: DeserializeOwned + Serialize + Default;
    /// The kind tag.
    const KIND: EntityKind;

    fn store_of(store: &SyncStore) -> &EntityStore<Self>;
    fn build(
        id: EntityId,
        owner: OwnerId,
        device: DeviceId,
        timestamp: Timestamp,
        patch: Self::Patch,
    ) -> Self;
    fn merge_patch(&mut self, patch: Self::Patch, timestamp: Timestamp, device: DeviceId);
    fn tombstone_at(&mut self, timestamp: Timestamp, device: DeviceId);
    fn resolve_refs(
        patch: &mut Self::Patch,
        owner: &OwnerId,
        resolver: &ReferenceResolver<'_>,
    ) -> EngineResult<()>;
}

impl Syncable for Space {
    type Patch = SpacePatch;
    const KIND: EntityKind = EntityKind::Space;

    fn store_of(store: &SyncStore) -> &EntityStore<Self> {
        store.spaces()
    }

    fn build(
        id: EntityId,
        owner: OwnerId,
        device: DeviceId,
        timestamp: Timestamp,
        patch: SpacePatch,
    ) -> Self {
        Space::create(id, owner, device, timestamp, patch)
    }

    fn merge_patch(&mut self, patch: SpacePatch, timestamp: Timestamp, device: DeviceId) {
        self.merge(patch, timestamp, device);
    }

    fn tombstone_at(&mut self, timestamp: Timestamp, device: DeviceId) {
        self.tombstone(timestamp, device);
    }

    fn resolve_refs(
        _patch: &mut SpacePatch,
        _owner: &OwnerId,
        _resolver: &ReferenceResolver<'_>,
    ) -> EngineResult<()> {
        // Spaces are roots; nothing to resolve.
        Ok(())
    }
}

impl Syncable for Category {
    type Patch = CategoryPatch;
    const KIND: EntityKind = EntityKind::Category;

    fn store_of(store: &SyncStore) -> &EntityStore<Self> {
        store.categories()
    }

    fn build(
        id: EntityId,
        owner: OwnerId,
        device: DeviceId,
        timestamp: Timestamp,
        patch: CategoryPatch,
    ) -> Self {
        Category::create(id, owner, device, timestamp, patch)
    }

    fn merge_patch(&mut self, patch: CategoryPatch, timestamp: Timestamp, device: DeviceId) {
        self.merge(patch, timestamp, device);
    }

    fn tombstone_at(&mut self, timestamp: Timestamp, device: DeviceId) {
        self.tombstone(timestamp, device);
    }

    fn resolve_refs(
        patch: &mut CategoryPatch,
        owner: &OwnerId,
        resolver: &ReferenceResolver<'_>,
    ) -> EngineResult<()> {
        resolver.sanitize_category(owner, patch)?;
        Ok(())
    }
}

impl Syncable for Item {
    type Patch = ItemPatch;
    const KIND: EntityKind = EntityKind::Item;

    fn store_of(store: &SyncStore) -> &EntityStore<Self> {
        store.items()
    }

    fn build(
        id: EntityId,
        owner: OwnerId,
        device: DeviceId,
        timestamp: Timestamp,
        patch: ItemPatch,
    ) -> Self {
        Item::create(id, owner, device, timestamp, patch)
    }

    fn merge_patch(&mut self, patch: ItemPatch, timestamp: Timestamp, device: DeviceId) {
        self.merge(patch, timestamp, device);
    }

    fn tombstone_at(&mut self, timestamp: Timestamp, device: DeviceId) {
        self.tombstone(timestamp, device);
    }

    fn resolve_refs(
        patch: &mut ItemPatch,
        owner: &OwnerId,
        resolver: &ReferenceResolver<'_>,
    ) -> EngineResult<()> {
        resolver.sanitize_item(owner, patch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn applier() -> (ChangeApplier, Arc<SyncStore>) {
        let store = Arc::new(SyncStore::new());
        (
            ChangeApplier::new(Arc::clone(&store), EngineConfig::default()),
            store,
        )
    }

    fn owner() -> OwnerId {
        OwnerId::new("u1")
    }

    fn device() -> DeviceId {
        DeviceId::new("d1")
    }

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn create_space(id: &str, name: &str, at: Timestamp) -> ChangeRecord {
        ChangeRecord::new(id, "space", "create")
            .with_data(json!({ "name": name }))
            .with_timestamp(at)
    }

    #[test]
    fn create_then_read_back() {
        let (applier, store) = applier();
        let outcome = applier
            .apply(&owner(), &device(), &create_space("s1", "Home", ts(0)), ts(0))
            .unwrap();

        assert!(!outcome.conflict);
        assert!(!outcome.duplicate);

        let space = store
            .spaces()
            .get(&owner(), &EntityId::new("s1"))
            .unwrap()
            .unwrap();
        assert_eq!(space.name, "Home");
        assert_eq!(space.updated_at, ts(0));
        assert_eq!(space.last_writer_device, device());
        assert_eq!(store.log().len(), 1);
    }

    #[test]
    fn create_is_idempotent_on_existing_id() {
        let (applier, store) = applier();
        applier
            .apply(&owner(), &device(), &create_space("s1", "Home", ts(0)), ts(0))
            .unwrap();

        // Same id, different delivery (later timestamp): success, but no
        // second entity and no second log entry.
        let outcome = applier
            .apply(&owner(), &device(), &create_space("s1", "Home again", ts(5)), ts(5))
            .unwrap();

        assert!(!outcome.duplicate);
        let space = store
            .spaces()
            .get(&owner(), &EntityId::new("s1"))
            .unwrap()
            .unwrap();
        assert_eq!(space.name, "Home");
        assert_eq!(store.log().len(), 1);
    }

    #[test]
    fn update_merges_only_present_fields() {
        let (applier, store) = applier();
        applier
            .apply(
                &owner(),
                &device(),
                &ChangeRecord::new("i1", "item", "create")
                    .with_data(json!({"title": "Milk", "notes": "2%"}))
                    .with_timestamp(ts(0)),
                ts(0),
            )
            .unwrap();

        applier
            .apply(
                &owner(),
                &device(),
                &ChangeRecord::new("i1", "item", "update")
                    .with_data(json!({"isCompleted": true}))
                    .with_timestamp(ts(10)),
                ts(10),
            )
            .unwrap();

        let item = store
            .items()
            .get(&owner(), &EntityId::new("i1"))
            .unwrap()
            .unwrap();
        assert_eq!(item.title, "Milk");
        assert_eq!(item.notes.as_deref(), Some("2%"));
        assert!(item.is_completed);
        assert_eq!(item.updated_at, ts(10));
    }

    #[test]
    fn stale_update_reports_conflict_and_leaves_state() {
        let (applier, store) = applier();
        applier
            .apply(&owner(), &device(), &create_space("s1", "Home", ts(0)), ts(0))
            .unwrap();

        // Apply the newer write first, then the older one out of order.
        applier
            .apply(
                &owner(),
                &device(),
                &ChangeRecord::new("s1", "space", "update")
                    .with_data(json!({"name": "Newest"}))
                    .with_timestamp(ts(20)),
                ts(20),
            )
            .unwrap();

        let outcome = applier
            .apply(
                &owner(),
                &DeviceId::new("d2"),
                &ChangeRecord::new("s1", "space", "update")
                    .with_data(json!({"name": "Older"}))
                    .with_timestamp(ts(10)),
                ts(20),
            )
            .unwrap();

        assert!(outcome.conflict);
        let space = store
            .spaces()
            .get(&owner(), &EntityId::new("s1"))
            .unwrap()
            .unwrap();
        assert_eq!(space.name, "Newest");
        assert_eq!(space.updated_at, ts(20));
    }

    #[test]
    fn equal_timestamp_update_is_accepted() {
        let (applier, store) = applier();
        applier
            .apply(&owner(), &device(), &create_space("s1", "Home", ts(0)), ts(0))
            .unwrap();

        let outcome = applier
            .apply(
                &owner(),
                &DeviceId::new("d2"),
                &ChangeRecord::new("s1", "space", "update")
                    .with_data(json!({"name": "Tied"}))
                    .with_timestamp(ts(0)),
                ts(0),
            )
            .unwrap();

        assert!(!outcome.conflict);
        let space = store
            .spaces()
            .get(&owner(), &EntityId::new("s1"))
            .unwrap()
            .unwrap();
        assert_eq!(space.name, "Tied");
    }

    #[test]
    fn update_of_missing_entity_is_not_found() {
        let (applier, _) = applier();
        let err = applier
            .apply(
                &owner(),
                &device(),
                &ChangeRecord::new("ghost", "item", "update").with_data(json!({"title": "x"})),
                ts(0),
            )
            .unwrap_err();

        assert!(matches!(err, EngineError::NotFound { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn delete_is_idempotent() {
        let (applier, store) = applier();

        // Never-existing id: success, nothing stored or logged.
        let outcome = applier
            .apply(
                &owner(),
                &device(),
                &ChangeRecord::new("ghost", "item", "delete").with_timestamp(ts(0)),
                ts(0),
            )
            .unwrap();
        assert!(!outcome.conflict);
        assert_eq!(store.log().len(), 0);

        // Existing entity: tombstoned, then deleting again is a no-op.
        applier
            .apply(&owner(), &device(), &create_space("s1", "Home", ts(0)), ts(0))
            .unwrap();
        applier
            .apply(
                &owner(),
                &device(),
                &ChangeRecord::new("s1", "space", "delete").with_timestamp(ts(5)),
                ts(5),
            )
            .unwrap();

        let space = store
            .spaces()
            .get(&owner(), &EntityId::new("s1"))
            .unwrap()
            .unwrap();
        assert_eq!(space.deleted_at, Some(ts(5)));
        assert_eq!(space.updated_at, ts(5));
        let logged = store.log().len();

        applier
            .apply(
                &owner(),
                &device(),
                &ChangeRecord::new("s1", "space", "delete").with_timestamp(ts(9)),
                ts(9),
            )
            .unwrap();
        let space = store
            .spaces()
            .get(&owner(), &EntityId::new("s1"))
            .unwrap()
            .unwrap();
        assert_eq!(space.deleted_at, Some(ts(5)));
        assert_eq!(store.log().len(), logged);
    }

    #[test]
    fn duplicate_operation_id_is_suppressed() {
        let (applier, store) = applier();
        let change = ChangeRecord::new("i1", "item", "create")
            .with_data(json!({"title": "once"}))
            .with_timestamp(ts(0))
            .with_operation_id("op-1");

        let first = applier.apply(&owner(), &device(), &change, ts(0)).unwrap();
        assert!(!first.duplicate);

        let second = applier.apply(&owner(), &device(), &change, ts(1)).unwrap();
        assert!(second.duplicate);
        assert_eq!(store.log().len(), 1);
    }

    #[test]
    fn natural_key_suppresses_retransmission() {
        let (applier, store) = applier();
        let change = ChangeRecord::new("i1", "item", "create")
            .with_data(json!({"title": "once"}))
            .with_timestamp(ts(0));

        applier.apply(&owner(), &device(), &change, ts(0)).unwrap();
        let second = applier.apply(&owner(), &device(), &change, ts(1)).unwrap();

        assert!(second.duplicate);
        assert_eq!(store.log().len(), 1);
    }

    #[test]
    fn structural_validation_failures() {
        let (applier, _) = applier();

        let missing_id = ChangeRecord {
            entity_kind: Some("space".into()),
            operation: Some("create".into()),
            ..ChangeRecord::default()
        };
        assert!(matches!(
            applier.apply(&owner(), &device(), &missing_id, ts(0)),
            Err(EngineError::InvalidChange(_))
        ));

        let unknown_kind = ChangeRecord::new("x", "folder", "create");
        assert!(matches!(
            applier.apply(&owner(), &device(), &unknown_kind, ts(0)),
            Err(EngineError::UnknownEntityKind(_))
        ));

        let unknown_op = ChangeRecord::new("x", "space", "upsert");
        assert!(matches!(
            applier.apply(&owner(), &device(), &unknown_op, ts(0)),
            Err(EngineError::InvalidChange(_))
        ));
    }

    #[test]
    fn dangling_parent_is_dropped_on_create() {
        let (applier, store) = applier();
        applier
            .apply(
                &owner(),
                &device(),
                &ChangeRecord::new("i1", "item", "create")
                    .with_data(json!({"title": "orphan", "categoryId": "missing"}))
                    .with_timestamp(ts(0)),
                ts(0),
            )
            .unwrap();

        let item = store
            .items()
            .get(&owner(), &EntityId::new("i1"))
            .unwrap()
            .unwrap();
        assert_eq!(item.category_id, None);
    }

    #[test]
    fn future_timestamp_is_clamped() {
        let (applier, store) = applier();
        let now = ts(0);
        let far_future = now + Duration::hours(2);

        applier
            .apply(
                &owner(),
                &device(),
                &create_space("s1", "Home", far_future),
                now,
            )
            .unwrap();

        let space = store
            .spaces()
            .get(&owner(), &EntityId::new("s1"))
            .unwrap()
            .unwrap();
        assert_eq!(space.updated_at, now);
    }

    #[test]
    fn small_skew_is_tolerated() {
        let (applier, store) = applier();
        let now = ts(0);
        let slightly_ahead = now + Duration::seconds(30);

        applier
            .apply(
                &owner(),
                &device(),
                &create_space("s1", "Home", slightly_ahead),
                now,
            )
            .unwrap();

        let space = store
            .spaces()
            .get(&owner(), &EntityId::new("s1"))
            .unwrap()
            .unwrap();
        assert_eq!(space.updated_at, slightly_ahead);
    }
}
