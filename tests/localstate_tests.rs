//! Integration tests for the local state cache

use mfx_migrator::localstate::{LocalStateCache, LocalStateError};
use mfx_migrator::store::WorkItemStatus;

#[path = "mod.rs"]
mod test_helpers;
use test_helpers::*;

#[test]
fn save_then_load_round_trips_the_work_item() {
    let cache = temp_cache();
    let mut item = work_item(WorkItemStatus::Migrating);
    item.manifest_hash = Some(DUMMY_TX_HASH.to_string());
    item.manifest_datetime = Some(block_time());
    item.error = Some("previous failure".to_string());

    cache.save(&item).unwrap();
    let loaded = cache.load(item.uuid).unwrap();
    assert_eq!(loaded, item);
}

#[test]
fn save_overwrites_the_previous_snapshot() {
    let cache = temp_cache();
    let mut item = work_item(WorkItemStatus::Claimed);
    cache.save(&item).unwrap();

    item.status = WorkItemStatus::Migrating;
    cache.save(&item).unwrap();

    let loaded = cache.load(item.uuid).unwrap();
    assert_eq!(loaded.status, WorkItemStatus::Migrating);
}

#[test]
fn loading_a_missing_snapshot_is_not_found() {
    let cache = temp_cache();
    let err = cache.load(dummy_uuid()).unwrap_err();
    assert!(matches!(err, LocalStateError::NotFound { .. }));
}

#[test]
fn loading_a_corrupt_snapshot_fails() {
    let dir = temp_state_dir();
    std::fs::write(dir.join(format!("{DUMMY_UUID}.json")), b"{not json").unwrap();

    let cache = LocalStateCache::new(dir);
    let err = cache.load(dummy_uuid()).unwrap_err();
    assert!(matches!(err, LocalStateError::Corrupt { .. }));
}

#[test]
fn delete_is_idempotent() {
    let cache = temp_cache();
    let item = work_item(WorkItemStatus::Claimed);
    cache.save(&item).unwrap();
    assert!(cache.exists(item.uuid));

    cache.delete(item.uuid).unwrap();
    assert!(!cache.exists(item.uuid));

    // Deleting again is fine.
    cache.delete(item.uuid).unwrap();
}
