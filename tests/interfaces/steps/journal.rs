//! Journal interface step definitions.

use cucumber::{given, then, when, World};
use shardjournal::storage::{StorageError, TableJournal};
use shardjournal::{Journal, Payload, PersistentRepr};

use crate::backend::{Deposited, StorageContext, JOURNAL_TABLE};

/// Test context for Journal scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct JournalWorld {
    context: Option<StorageContext>,
    persistence_id: String,
    replayed: Vec<PersistentRepr>,
    replay_count: u64,
    last_error: Option<StorageError>,
}

impl JournalWorld {
    fn new() -> Self {
        Self {
            context: None,
            persistence_id: String::new(),
            replayed: Vec::new(),
            replay_count: 0,
            last_error: None,
        }
    }

    fn context(&self) -> &StorageContext {
        self.context
            .as_ref()
            .expect("Storage context not initialized")
    }

    fn journal(&self) -> &TableJournal {
        &self.context().journal
    }

    fn make_event(&self, seq: u64) -> PersistentRepr {
        PersistentRepr::new(
            &self.persistence_id,
            seq,
            Payload::new("deposited", Deposited { amount: seq * 10 }),
        )
    }

    async fn write(&mut self, sequences: impl IntoIterator<Item = u64>) {
        let events = sequences.into_iter().map(|seq| self.make_event(seq)).collect();
        self.last_error = self.journal().write_messages(events).await.err();
    }

    async fn replay(&mut self, from: u64, to: u64, max: u64) {
        let mut replayed = Vec::new();
        self.replay_count = self
            .journal()
            .replay_messages(&self.persistence_id, from, to, max, &mut |repr| {
                replayed.push(repr)
            })
            .await
            .expect("Failed to replay events");
        self.replayed = replayed;
    }
}

fn parse_sequences(list: &str) -> Vec<u64> {
    list.split(',')
        .map(|s| s.trim().parse().expect("Invalid sequence number"))
        .collect()
}

// --- Background ---

#[given(expr = "a journal over {int} in-memory shards")]
async fn given_journal(world: &mut JournalWorld, shard_count: usize) {
    world.context = Some(StorageContext::new(shard_count).await);
}

// --- Given steps ---

#[given(expr = "a stream {string} with no events")]
fn given_empty_stream(world: &mut JournalWorld, persistence_id: String) {
    world.persistence_id = persistence_id;
}

#[given(expr = "a stream {string} with events {int} to {int}")]
async fn given_stream_with_events(
    world: &mut JournalWorld,
    persistence_id: String,
    from: u64,
    to: u64,
) {
    world.persistence_id = persistence_id;
    world.write(from..=to).await;
    if let Some(e) = &world.last_error {
        panic!("Failed to write events: {}", e);
    }
}

// --- When steps ---

#[when(expr = "I write events {int} to {int} in reverse order")]
async fn when_write_reversed(world: &mut JournalWorld, from: u64, to: u64) {
    world.write((from..=to).rev()).await;
}

#[when(expr = "I write events with sequence numbers {string}")]
async fn when_write_sequences(world: &mut JournalWorld, list: String) {
    world.write(parse_sequences(&list)).await;
}

#[when(expr = "I replay from {int} to {int}")]
async fn when_replay(world: &mut JournalWorld, from: u64, to: u64) {
    world.replay(from, to, u64::MAX).await;
}

#[when(expr = "I replay from {int} to {int} with a maximum of {int}")]
async fn when_replay_max(world: &mut JournalWorld, from: u64, to: u64, max: u64) {
    world.replay(from, to, max).await;
}

#[when(expr = "I soft delete events up to {int}")]
async fn when_soft_delete(world: &mut JournalWorld, to: u64) {
    world
        .journal()
        .delete_messages_to(&world.persistence_id, to, false)
        .await
        .expect("Failed to soft delete events");
}

#[when(expr = "I permanently delete events up to {int}")]
async fn when_permanent_delete(world: &mut JournalWorld, to: u64) {
    world
        .journal()
        .delete_messages_to(&world.persistence_id, to, true)
        .await
        .expect("Failed to delete events");
}

// --- Then steps ---

#[then(expr = "{int} events should be replayed")]
fn then_replay_count(world: &mut JournalWorld, expected: u64) {
    assert_eq!(world.replay_count, expected, "Unexpected replay count");
    assert_eq!(world.replayed.len() as u64, expected);
}

#[then(expr = "the replayed sequence numbers should be {string}")]
fn then_replayed_sequences(world: &mut JournalWorld, list: String) {
    let actual: Vec<u64> = world.replayed.iter().map(|e| e.sequence_nr).collect();
    assert_eq!(actual, parse_sequences(&list));
    for event in &world.replayed {
        assert_eq!(event.persistence_id, world.persistence_id);
        let payload = event
            .payload
            .downcast_ref::<Deposited>()
            .expect("Payload should be Deposited");
        assert_eq!(payload.amount, event.sequence_nr * 10);
    }
}

#[then(expr = "the highest sequence number should be {int}")]
async fn then_highest(world: &mut JournalWorld, expected: u64) {
    let highest = world
        .journal()
        .read_highest_sequence_nr(&world.persistence_id, 0)
        .await
        .expect("Failed to read highest sequence number");
    assert_eq!(highest, expected);
}

#[then("the write should succeed")]
fn then_write_succeeds(world: &mut JournalWorld) {
    assert!(
        world.last_error.is_none(),
        "Expected success but got error: {:?}",
        world.last_error
    );
}

#[then("the write should fail with a duplicate sequence error")]
fn then_write_duplicate(world: &mut JournalWorld) {
    assert!(
        matches!(world.last_error, Some(StorageError::DuplicateSequence { .. })),
        "Expected DuplicateSequence, got {:?}",
        world.last_error
    );
}

#[then("the write should fail with a conflict")]
fn then_write_conflict(world: &mut JournalWorld) {
    assert!(
        matches!(world.last_error, Some(StorageError::Conflict { .. })),
        "Expected Conflict, got {:?}",
        world.last_error
    );
}

#[then(expr = "shard {int} should hold {int} rows")]
async fn then_shard_rows(world: &mut JournalWorld, shard: usize, expected: usize) {
    let backend = world
        .context()
        .table_backends
        .get(shard)
        .expect("No such shard");
    assert_eq!(
        backend.row_count(JOURNAL_TABLE).await,
        expected,
        "Unexpected row count on shard {}",
        shard
    );
}
