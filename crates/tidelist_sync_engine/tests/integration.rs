//! Integration tests driving full multi-device sync flows through the
//! orchestrator.

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tidelist_core::{EntityId, OwnerId, SyncStore, Timestamp};
use tidelist_sync_engine::{EngineConfig, SyncOrchestrator};
use tidelist_sync_protocol::{ChangeRecord, SyncRequest};

fn orchestrator() -> SyncOrchestrator {
    SyncOrchestrator::new(Arc::new(SyncStore::new()), EngineConfig::default())
}

fn owner() -> OwnerId {
    OwnerId::new("account-1")
}

fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn create(id: &str, kind: &str, data: serde_json::Value, at: Timestamp) -> ChangeRecord {
    ChangeRecord::new(id, kind, "create")
        .with_data(data)
        .with_timestamp(at)
}

#[test]
fn two_devices_converge_through_deltas() {
    let orch = orchestrator();

    // Device A builds a space → category → item hierarchy in one batch.
    let from_a = orch
        .sync(
            &owner(),
            &SyncRequest::for_device("phone")
                .with_change(create("s1", "space", json!({"name": "Home"}), ts(0)))
                .with_change(create(
                    "c1",
                    "category",
                    json!({"name": "Chores", "spaceId": "s1"}),
                    ts(1),
                ))
                .with_change(create(
                    "i1",
                    "item",
                    json!({"title": "Sweep", "spaceId": "s1", "categoryId": "c1"}),
                    ts(2),
                )),
        )
        .unwrap();
    assert!(from_a.acknowledgements.iter().all(|a| a.success));

    // Device B syncs from the epoch and receives the full hierarchy.
    let to_b = orch
        .sync(&owner(), &SyncRequest::for_device("laptop"))
        .unwrap();
    assert_eq!(to_b.server_updates.spaces.len(), 1);
    assert_eq!(to_b.server_updates.categories.len(), 1);
    assert_eq!(to_b.server_updates.items.len(), 1);

    // B completes the item; A resumes from its checkpoint and receives only
    // that edit.
    let edit_at = Utc::now();
    orch.sync(
        &owner(),
        &SyncRequest::for_device("laptop")
            .since(to_b.sync_timestamp)
            .with_change(
                ChangeRecord::new("i1", "item", "update")
                    .with_data(json!({"isCompleted": true}))
                    .with_timestamp(edit_at),
            ),
    )
    .unwrap();

    let back_to_a = orch
        .sync(
            &owner(),
            &SyncRequest::for_device("phone").since(from_a.sync_timestamp),
        )
        .unwrap();
    assert!(back_to_a.server_updates.spaces.is_empty());
    assert!(back_to_a.server_updates.categories.is_empty());
    assert_eq!(back_to_a.server_updates.items.len(), 1);
    assert!(back_to_a.server_updates.items[0].is_completed);

    // Both devices know two device records exist.
    let devices = orch.store().devices().list(&owner()).unwrap();
    assert_eq!(devices.len(), 2);
}

#[test]
fn concurrent_offline_edits_resolve_last_write_wins() {
    let orch = orchestrator();
    orch.sync(
        &owner(),
        &SyncRequest::for_device("phone")
            .with_change(create("i1", "item", json!({"title": "Draft"}), ts(0))),
    )
    .unwrap();

    // The laptop edited later (ts 100) but reconnects first; the phone's
    // earlier edit (ts 50) arrives afterwards and must lose.
    let from_laptop = orch
        .sync(
            &owner(),
            &SyncRequest::for_device("laptop").with_change(
                ChangeRecord::new("i1", "item", "update")
                    .with_data(json!({"title": "Laptop wording"}))
                    .with_timestamp(ts(100)),
            ),
        )
        .unwrap();
    assert!(!from_laptop.acknowledgements[0].conflict);

    let from_phone = orch
        .sync(
            &owner(),
            &SyncRequest::for_device("phone").with_change(
                ChangeRecord::new("i1", "item", "update")
                    .with_data(json!({"title": "Phone wording"}))
                    .with_timestamp(ts(50)),
            ),
        )
        .unwrap();
    assert!(from_phone.acknowledgements[0].success);
    assert!(from_phone.acknowledgements[0].conflict);

    // The losing device still receives the authoritative version in the same
    // response's delta.
    let item = from_phone
        .server_updates
        .items
        .iter()
        .find(|i| i.id == EntityId::new("i1"))
        .unwrap();
    assert_eq!(item.title, "Laptop wording");
    assert_eq!(item.updated_at, ts(100));
}

#[test]
fn redelivered_batch_is_fully_suppressed() {
    let orch = orchestrator();
    let batch = SyncRequest::for_device("phone")
        .with_change(
            create("s1", "space", json!({"name": "Home"}), ts(0)).with_operation_id("op-1"),
        )
        .with_change(
            create("i1", "item", json!({"title": "Sweep"}), ts(1)).with_operation_id("op-2"),
        );

    let first = orch.sync(&owner(), &batch).unwrap();
    assert!(first.acknowledgements.iter().all(|a| !a.duplicate));
    assert_eq!(orch.store().log().len(), 2);

    // The client never saw the response and retries the whole batch.
    let second = orch.sync(&owner(), &batch).unwrap();
    assert!(second.acknowledgements.iter().all(|a| a.success && a.duplicate));
    assert_eq!(orch.store().log().len(), 2);

    let item = orch
        .store()
        .items()
        .get(&owner(), &EntityId::new("i1"))
        .unwrap()
        .unwrap();
    assert_eq!(item.updated_at, ts(1));
}

#[test]
fn deletion_reaches_other_devices_but_not_fresh_ones() {
    let orch = orchestrator();
    let seeded = orch
        .sync(
            &owner(),
            &SyncRequest::for_device("phone")
                .with_change(create("s1", "space", json!({"name": "Home"}), ts(0)))
                .with_change(create("i1", "item", json!({"title": "Sweep"}), ts(1))),
        )
        .unwrap();

    // The laptop catches up, then the phone deletes the item.
    let laptop_checkpoint = orch
        .sync(&owner(), &SyncRequest::for_device("laptop"))
        .unwrap()
        .sync_timestamp;

    orch.sync(
        &owner(),
        &SyncRequest::for_device("phone")
            .since(seeded.sync_timestamp)
            .with_change(ChangeRecord::new("i1", "item", "delete")),
    )
    .unwrap();

    // The laptop's next delta carries the tombstone so it can drop its local
    // copy.
    let to_laptop = orch
        .sync(
            &owner(),
            &SyncRequest::for_device("laptop").since(laptop_checkpoint),
        )
        .unwrap();
    assert_eq!(to_laptop.server_updates.items.len(), 1);
    assert!(to_laptop.server_updates.items[0].deleted_at.is_some());

    // A brand-new device bootstrapping through initial load never sees it.
    let initial = orch.initial_load(&owner()).unwrap();
    assert_eq!(initial.spaces.len(), 1);
    assert!(initial.items.is_empty());
}

#[test]
fn orphan_is_adopted_once_the_parent_arrives() {
    let orch = orchestrator();

    // The item names a category the server has never seen (it lives on a
    // device that has not reconnected yet). The reference is dropped, not
    // the change.
    let orphaned = orch
        .sync(
            &owner(),
            &SyncRequest::for_device("phone").with_change(create(
                "i1",
                "item",
                json!({"title": "Sweep", "categoryId": "c1"}),
                ts(0),
            )),
        )
        .unwrap();
    assert!(orphaned.acknowledgements[0].success);

    let item = orch
        .store()
        .items()
        .get(&owner(), &EntityId::new("i1"))
        .unwrap()
        .unwrap();
    assert_eq!(item.category_id, None);

    // The other device reconnects with the category, and a follow-up update
    // re-links the item.
    orch.sync(
        &owner(),
        &SyncRequest::for_device("laptop")
            .with_change(create("c1", "category", json!({"name": "Chores"}), ts(10)))
            .with_change(
                ChangeRecord::new("i1", "item", "update")
                    .with_data(json!({"categoryId": "c1"}))
                    .with_timestamp(ts(11)),
            ),
    )
    .unwrap();

    let item = orch
        .store()
        .items()
        .get(&owner(), &EntityId::new("i1"))
        .unwrap()
        .unwrap();
    assert_eq!(item.category_id, Some(EntityId::new("c1")));
}

#[test]
fn malformed_changes_fail_alone_and_are_retryable() {
    let orch = orchestrator();
    let response = orch
        .sync(
            &owner(),
            &SyncRequest::for_device("phone")
                .with_change(ChangeRecord::new("x1", "notebook", "create"))
                .with_change(ChangeRecord {
                    entity_kind: Some("item".into()),
                    operation: Some("create".into()),
                    ..ChangeRecord::default()
                })
                .with_change(create("s1", "space", json!({"name": "Home"}), ts(0))),
        )
        .unwrap();

    assert!(!response.acknowledgements[0].success);
    assert!(response.acknowledgements[0]
        .error
        .as_deref()
        .unwrap()
        .contains("unknown entity kind"));
    assert!(!response.acknowledgements[1].success);
    assert!(response.acknowledgements[2].success);

    // The caller can retry exactly the failed subset; the repaired change
    // applies cleanly.
    let retry = orch
        .sync(
            &owner(),
            &SyncRequest::for_device("phone")
                .with_change(create("x1", "item", json!({"title": "Fixed"}), ts(5))),
        )
        .unwrap();
    assert!(retry.acknowledgements[0].success);
}
