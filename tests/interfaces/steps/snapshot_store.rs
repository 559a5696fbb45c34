//! SnapshotStore interface step definitions.

use chrono::{DateTime, Duration, Utc};
use cucumber::{given, then, when, World};
use shardjournal::storage::StorageError;
use shardjournal::{
    Payload, SelectedSnapshot, SnapshotMetadata, SnapshotSelectionCriteria, SnapshotStore,
};

use crate::backend::{AccountState, StorageContext, SNAPSHOT_CONTAINER};

/// Test context for SnapshotStore scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct SnapshotStoreWorld {
    context: Option<StorageContext>,
    kind: String,
    persistence_id: String,
    base_time: DateTime<Utc>,
    last_snapshot: Option<SelectedSnapshot>,
    last_error: Option<StorageError>,
}

impl SnapshotStoreWorld {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            context: None,
            kind: String::new(),
            persistence_id: String::new(),
            // Stored timestamps keep microsecond precision.
            base_time: DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now),
            last_snapshot: None,
            last_error: None,
        }
    }

    fn context(&self) -> &StorageContext {
        self.context
            .as_ref()
            .expect("Storage context not initialized")
    }

    fn store(&self) -> &dyn SnapshotStore {
        let context = self.context();
        match self.kind.as_str() {
            "table" => context.table_snapshot_store.as_ref() as &dyn SnapshotStore,
            "object" => context.object_snapshot_store.as_ref() as &dyn SnapshotStore,
            other => panic!("Unknown snapshot store kind: {}", other),
        }
    }

    /// Snapshot `seq` is stamped `seq` seconds after the scenario's base time.
    fn metadata(&self, seq: u64) -> SnapshotMetadata {
        SnapshotMetadata::new(
            &self.persistence_id,
            seq,
            self.base_time + Duration::seconds(seq as i64),
        )
    }

    async fn save(&mut self, seq: u64, balance: u64) {
        let metadata = self.metadata(seq);
        let state = Payload::new("account_state", AccountState { balance });
        self.last_error = self.store().save(&metadata, &state).await.err();
    }

    async fn load(&mut self, criteria: SnapshotSelectionCriteria) {
        self.last_snapshot = self
            .store()
            .load(&self.persistence_id, &criteria)
            .await
            .expect("Failed to load snapshot");
    }
}

fn parse_sequences(list: &str) -> Vec<u64> {
    list.split(',')
        .map(|s| s.trim().parse().expect("Invalid sequence number"))
        .collect()
}

// --- Given steps ---

#[given(expr = "the {word} snapshot store")]
async fn given_snapshot_store(world: &mut SnapshotStoreWorld, kind: String) {
    world.context = Some(StorageContext::new(16).await);
    world.kind = kind;
}

#[given(expr = "a stream {string} with no snapshots")]
fn given_stream_without_snapshots(world: &mut SnapshotStoreWorld, persistence_id: String) {
    world.persistence_id = persistence_id;
}

#[given(expr = "a stream {string} with snapshots at sequences {string}")]
async fn given_stream_with_snapshots(
    world: &mut SnapshotStoreWorld,
    persistence_id: String,
    list: String,
) {
    world.persistence_id = persistence_id;
    for seq in parse_sequences(&list) {
        world.save(seq, seq * 100).await;
        if let Some(e) = &world.last_error {
            panic!("Failed to save snapshot: {}", e);
        }
    }
}

// --- When steps ---

#[when(expr = "I switch to stream {string}")]
fn when_switch_stream(world: &mut SnapshotStoreWorld, persistence_id: String) {
    world.persistence_id = persistence_id;
}

#[when(expr = "I save a snapshot at sequence {int} with balance {int}")]
async fn when_save(world: &mut SnapshotStoreWorld, seq: u64, balance: u64) {
    world.save(seq, balance).await;
}

#[when("I load the latest snapshot")]
async fn when_load_latest(world: &mut SnapshotStoreWorld) {
    world.load(SnapshotSelectionCriteria::latest()).await;
}

#[when(expr = "I load the youngest snapshot at or below sequence {int}")]
async fn when_load_by_sequence(world: &mut SnapshotStoreWorld, max_seq: u64) {
    world
        .load(SnapshotSelectionCriteria::new(max_seq, DateTime::<Utc>::MAX_UTC))
        .await;
}

#[when(expr = "I load the youngest snapshot taken within {int} seconds")]
async fn when_load_by_time(world: &mut SnapshotStoreWorld, seconds: i64) {
    let max_timestamp = world.base_time + Duration::seconds(seconds);
    world
        .load(SnapshotSelectionCriteria::new(u64::MAX, max_timestamp))
        .await;
}

#[when(expr = "I delete the snapshot at sequence {int}")]
async fn when_delete(world: &mut SnapshotStoreWorld, seq: u64) {
    let metadata = world.metadata(seq);
    world.last_error = world.store().delete(&metadata).await.err();
}

#[when(expr = "I delete snapshots at or below sequence {int}")]
async fn when_delete_matching(world: &mut SnapshotStoreWorld, max_seq: u64) {
    let criteria = SnapshotSelectionCriteria::new(max_seq, DateTime::<Utc>::MAX_UTC);
    world.last_error = world
        .store()
        .delete_matching(&world.persistence_id, &criteria)
        .await
        .err();
}

// --- Then steps ---

#[then("no snapshot should be found")]
fn then_no_snapshot(world: &mut SnapshotStoreWorld) {
    assert!(
        world.last_snapshot.is_none(),
        "Expected no snapshot but found {:?}",
        world.last_snapshot
    );
}

#[then(expr = "the snapshot should have sequence {int}")]
fn then_snapshot_sequence(world: &mut SnapshotStoreWorld, expected: u64) {
    let snapshot = world.last_snapshot.as_ref().expect("No snapshot found");
    assert_eq!(snapshot.metadata.sequence_nr, expected);
    assert_eq!(snapshot.metadata.persistence_id, world.persistence_id);
    assert_eq!(snapshot.metadata.timestamp, world.metadata(expected).timestamp);
}

#[then(expr = "the snapshot should have balance {int}")]
fn then_snapshot_balance(world: &mut SnapshotStoreWorld, expected: u64) {
    let snapshot = world.last_snapshot.as_ref().expect("No snapshot found");
    let state = snapshot
        .snapshot
        .downcast_ref::<AccountState>()
        .expect("Snapshot should be AccountState");
    assert_eq!(state.balance, expected);
}

#[then("the operation should succeed")]
fn then_operation_succeeds(world: &mut SnapshotStoreWorld) {
    assert!(
        world.last_error.is_none(),
        "Expected success but got error: {:?}",
        world.last_error
    );
}

#[then("the save should fail with a conflict")]
fn then_save_conflict(world: &mut SnapshotStoreWorld) {
    assert!(
        matches!(world.last_error, Some(StorageError::Conflict { .. })),
        "Expected Conflict, got {:?}",
        world.last_error
    );
}

#[then(expr = "shard {int} should hold the object {string}")]
async fn then_shard_object(world: &mut SnapshotStoreWorld, shard: usize, name: String) {
    let backend = world
        .context()
        .object_backends
        .get(shard)
        .expect("No such shard");
    assert_eq!(backend.object_names(SNAPSHOT_CONTAINER).await, vec![name]);
}
