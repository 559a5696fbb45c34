//! SnapshotStore interface tests.
//!
//! These tests verify the contract of the SnapshotStore trait.
//! Each storage backend should run these tests against both store kinds.

use chrono::{DateTime, Duration, Utc};

use shardjournal::{
    Payload, SelectedSnapshot, SnapshotMetadata, SnapshotSelectionCriteria, SnapshotStore,
};

use super::{now_micros, unique_pid, AccountState};

/// Create a test snapshot payload.
pub fn make_state(balance: u64) -> Payload {
    Payload::new(
        "account_state",
        AccountState {
            balance,
            owner: "ada".to_string(),
        },
    )
}

async fn load_latest<S: SnapshotStore>(store: &S, pid: &str) -> Option<SelectedSnapshot> {
    store
        .load(pid, &SnapshotSelectionCriteria::latest())
        .await
        .expect("load should succeed")
}

fn balance(selected: &SelectedSnapshot) -> u64 {
    selected
        .snapshot
        .downcast_ref::<AccountState>()
        .expect("snapshot should decode to AccountState")
        .balance
}

// =============================================================================
// SnapshotStore::load / save tests
// =============================================================================

pub async fn test_load_nonexistent<S: SnapshotStore>(store: &S) {
    let pid = unique_pid("none");
    assert!(load_latest(store, &pid).await.is_none(), "no snapshot expected");
}

pub async fn test_save_and_load<S: SnapshotStore>(store: &S) {
    let pid = unique_pid("save");
    let metadata = SnapshotMetadata::new(&pid, 5, now_micros());

    store
        .save(&metadata, &make_state(500))
        .await
        .expect("save should succeed");

    let loaded = load_latest(store, &pid).await.expect("snapshot should exist");
    assert_eq!(loaded.metadata, metadata);
    assert_eq!(loaded.snapshot.type_tag(), "account_state");
    assert_eq!(balance(&loaded), 500);
}

pub async fn test_load_selects_youngest_match<S: SnapshotStore>(store: &S) {
    let pid = unique_pid("youngest");
    let base = now_micros();

    for seq in [10u64, 20, 30] {
        let metadata = SnapshotMetadata::new(&pid, seq, base + Duration::seconds(seq as i64));
        store
            .save(&metadata, &make_state(seq * 100))
            .await
            .expect("save should succeed");
    }

    let latest = load_latest(store, &pid).await.expect("snapshot should exist");
    assert_eq!(latest.metadata.sequence_nr, 30);
    assert_eq!(balance(&latest), 3000);

    let by_sequence = store
        .load(&pid, &SnapshotSelectionCriteria::new(25, DateTime::<Utc>::MAX_UTC))
        .await
        .expect("load should succeed")
        .expect("snapshot should exist");
    assert_eq!(by_sequence.metadata.sequence_nr, 20);

    let by_time = store
        .load(&pid, &SnapshotSelectionCriteria::new(u64::MAX, base + Duration::seconds(15)))
        .await
        .expect("load should succeed")
        .expect("snapshot should exist");
    assert_eq!(by_time.metadata.sequence_nr, 10);

    let none = store
        .load(&pid, &SnapshotSelectionCriteria::new(5, DateTime::<Utc>::MAX_UTC))
        .await
        .expect("load should succeed");
    assert!(none.is_none(), "no snapshot at or below sequence 5");
}

pub async fn test_streams_are_isolated<S: SnapshotStore>(store: &S) {
    // One id is a prefix of the other.
    let short = unique_pid("acct");
    let long = format!("{}1", short);

    store
        .save(&SnapshotMetadata::new(&long, 9, now_micros()), &make_state(9))
        .await
        .expect("save should succeed");
    store
        .save(&SnapshotMetadata::new(&short, 1, now_micros()), &make_state(1))
        .await
        .expect("save should succeed");

    let loaded = load_latest(store, &short).await.expect("snapshot should exist");
    assert_eq!(loaded.metadata.persistence_id, short);
    assert_eq!(loaded.metadata.sequence_nr, 1);
}

// =============================================================================
// SnapshotStore::delete / delete_matching tests
// =============================================================================

pub async fn test_delete_single<S: SnapshotStore>(store: &S) {
    let pid = unique_pid("delete");
    let base = now_micros();
    let first = SnapshotMetadata::new(&pid, 1, base);
    let second = SnapshotMetadata::new(&pid, 2, base + Duration::seconds(1));

    store.save(&first, &make_state(1)).await.expect("save should succeed");
    store.save(&second, &make_state(2)).await.expect("save should succeed");

    store.delete(&second).await.expect("delete should succeed");

    let loaded = load_latest(store, &pid).await.expect("older snapshot should remain");
    assert_eq!(loaded.metadata.sequence_nr, 1);
}

pub async fn test_delete_nonexistent<S: SnapshotStore>(store: &S) {
    let pid = unique_pid("delete-none");
    store
        .delete(&SnapshotMetadata::new(&pid, 7, now_micros()))
        .await
        .expect("deleting an absent snapshot should succeed");
}

pub async fn test_delete_matching<S: SnapshotStore>(store: &S) {
    let pid = unique_pid("delete-matching");
    let base = now_micros();

    for seq in 1..=4u64 {
        let metadata = SnapshotMetadata::new(&pid, seq, base + Duration::seconds(seq as i64));
        store
            .save(&metadata, &make_state(seq))
            .await
            .expect("save should succeed");
    }

    store
        .delete_matching(
            &pid,
            &SnapshotSelectionCriteria::new(3, DateTime::<Utc>::MAX_UTC),
        )
        .await
        .expect("delete_matching should succeed");

    let loaded = load_latest(store, &pid).await.expect("newest snapshot should remain");
    assert_eq!(loaded.metadata.sequence_nr, 4);

    store
        .delete(&loaded.metadata)
        .await
        .expect("delete should succeed");
    assert!(load_latest(store, &pid).await.is_none(), "all snapshots removed");

    store
        .delete_matching(&pid, &SnapshotSelectionCriteria::latest())
        .await
        .expect("delete_matching on empty stream should succeed");
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all SnapshotStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_snapshot_store_tests {
    ($store:expr) => {
        use $crate::storage::snapshot_store_tests::*;

        test_load_nonexistent($store).await;
        println!("  test_load_nonexistent: PASSED");

        test_save_and_load($store).await;
        println!("  test_save_and_load: PASSED");

        test_load_selects_youngest_match($store).await;
        println!("  test_load_selects_youngest_match: PASSED");

        test_streams_are_isolated($store).await;
        println!("  test_streams_are_isolated: PASSED");

        test_delete_single($store).await;
        println!("  test_delete_single: PASSED");

        test_delete_nonexistent($store).await;
        println!("  test_delete_nonexistent: PASSED");

        test_delete_matching($store).await;
        println!("  test_delete_matching: PASSED");
    };
}
