//! Journal interface tests.
//!
//! These tests verify the contract of the Journal trait.
//! Each storage backend should run these tests.

use shardjournal::storage::StorageError;
use shardjournal::{Journal, Payload, PersistentRepr};

use super::{unique_pid, Deposited};

/// Create a test event at the given sequence.
pub fn make_event(pid: &str, seq: u64) -> PersistentRepr {
    PersistentRepr::new(pid, seq, Payload::new("deposited", Deposited { amount: seq * 10 }))
}

pub fn make_events(pid: &str, range: std::ops::RangeInclusive<u64>) -> Vec<PersistentRepr> {
    range.map(|seq| make_event(pid, seq)).collect()
}

async fn replay<J: Journal>(journal: &J, pid: &str, from: u64, to: u64, max: u64) -> Vec<PersistentRepr> {
    let mut events = Vec::new();
    let count = journal
        .replay_messages(pid, from, to, max, &mut |repr| events.push(repr))
        .await
        .expect("replay should succeed");
    assert_eq!(count, events.len() as u64, "returned count should match callbacks");
    events
}

fn sequences(events: &[PersistentRepr]) -> Vec<u64> {
    events.iter().map(|e| e.sequence_nr).collect()
}

// =============================================================================
// Journal::read_highest_sequence_nr tests
// =============================================================================

pub async fn test_highest_of_empty_stream<J: Journal>(journal: &J) {
    let pid = unique_pid("empty");

    let highest = journal
        .read_highest_sequence_nr(&pid, 0)
        .await
        .expect("read_highest should succeed");
    assert_eq!(highest, 0, "empty stream should report 0");
}

pub async fn test_highest_after_writes<J: Journal>(journal: &J) {
    let pid = unique_pid("highest");

    journal
        .write_messages(make_events(&pid, 1..=3))
        .await
        .expect("first write should succeed");
    journal
        .write_messages(make_events(&pid, 4..=6))
        .await
        .expect("second write should succeed");

    assert_eq!(journal.read_highest_sequence_nr(&pid, 0).await.unwrap(), 6);
    assert_eq!(journal.read_highest_sequence_nr(&pid, 6).await.unwrap(), 6);
    assert_eq!(journal.read_highest_sequence_nr(&pid, 7).await.unwrap(), 0);
}

// =============================================================================
// Journal::write_messages / replay_messages tests
// =============================================================================

pub async fn test_replay_in_sequence_order<J: Journal>(journal: &J) {
    let pid = unique_pid("order");

    // Written out of order in one call; stored and replayed sorted.
    let mut events = make_events(&pid, 1..=12);
    events.reverse();
    journal
        .write_messages(events)
        .await
        .expect("write should succeed");

    let replayed = replay(journal, &pid, 0, u64::MAX, u64::MAX).await;
    assert_eq!(sequences(&replayed), (1..=12).collect::<Vec<_>>());

    let tenth = replayed[9]
        .payload
        .downcast_ref::<Deposited>()
        .expect("payload should decode to Deposited");
    assert_eq!(tenth, &Deposited { amount: 100 });
    assert!(replayed.iter().all(|e| e.persistence_id == pid && !e.deleted));
}

pub async fn test_replay_window<J: Journal>(journal: &J) {
    let pid = unique_pid("window");
    journal
        .write_messages(make_events(&pid, 1..=10))
        .await
        .expect("write should succeed");

    assert_eq!(sequences(&replay(journal, &pid, 3, 7, u64::MAX).await), vec![3, 4, 5, 6, 7]);
    assert_eq!(sequences(&replay(journal, &pid, 9, 100, u64::MAX).await), vec![9, 10]);
    assert_eq!(sequences(&replay(journal, &pid, 5, 5, u64::MAX).await), vec![5]);
}

pub async fn test_replay_max<J: Journal>(journal: &J) {
    let pid = unique_pid("max");
    journal
        .write_messages(make_events(&pid, 1..=10))
        .await
        .expect("write should succeed");

    assert_eq!(sequences(&replay(journal, &pid, 1, 10, 3).await), vec![1, 2, 3]);
    assert_eq!(sequences(&replay(journal, &pid, 4, 10, 1).await), vec![4]);
}

pub async fn test_replay_empty_requests<J: Journal>(journal: &J) {
    let pid = unique_pid("noop");
    journal
        .write_messages(make_events(&pid, 1..=3))
        .await
        .expect("write should succeed");

    assert!(replay(journal, &pid, 1, 3, 0).await.is_empty(), "max 0 delivers nothing");
    assert!(replay(journal, &pid, 3, 1, 10).await.is_empty(), "to < from delivers nothing");
    assert!(replay(journal, &unique_pid("other"), 0, u64::MAX, 10).await.is_empty());
}

pub async fn test_multi_stream_write<J: Journal>(journal: &J) {
    let first = unique_pid("multi-a");
    let second = unique_pid("multi-b");

    let mut events = make_events(&first, 1..=3);
    events.extend(make_events(&second, 1..=2));
    journal
        .write_messages(events)
        .await
        .expect("write should succeed");

    assert_eq!(journal.read_highest_sequence_nr(&first, 0).await.unwrap(), 3);
    assert_eq!(journal.read_highest_sequence_nr(&second, 0).await.unwrap(), 2);
}

pub async fn test_duplicate_sequence_rejected<J: Journal>(journal: &J) {
    let pid = unique_pid("dup");

    let result = journal
        .write_messages(vec![make_event(&pid, 1), make_event(&pid, 2), make_event(&pid, 1)])
        .await;
    assert!(
        matches!(result, Err(StorageError::DuplicateSequence { sequence_nr: 1, .. })),
        "duplicate sequence in one write should be rejected"
    );
    assert_eq!(journal.read_highest_sequence_nr(&pid, 0).await.unwrap(), 0);
}

pub async fn test_rewrite_conflicts_and_is_atomic<J: Journal>(journal: &J) {
    let pid = unique_pid("rewrite");
    journal
        .write_messages(make_events(&pid, 1..=2))
        .await
        .expect("write should succeed");

    let result = journal.write_messages(make_events(&pid, 2..=4)).await;
    assert!(
        matches!(result, Err(StorageError::Conflict { .. })),
        "rewriting a stored sequence should conflict"
    );
    assert_eq!(
        journal.read_highest_sequence_nr(&pid, 0).await.unwrap(),
        2,
        "failed batch should write nothing"
    );
}

// =============================================================================
// Journal::delete_messages_to tests
// =============================================================================

pub async fn test_soft_delete<J: Journal>(journal: &J) {
    let pid = unique_pid("soft");
    journal
        .write_messages(make_events(&pid, 1..=5))
        .await
        .expect("write should succeed");

    journal
        .delete_messages_to(&pid, 3, false)
        .await
        .expect("soft delete should succeed");

    assert_eq!(sequences(&replay(journal, &pid, 0, u64::MAX, u64::MAX).await), vec![4, 5]);
    assert_eq!(
        journal.read_highest_sequence_nr(&pid, 0).await.unwrap(),
        5,
        "tombstones keep the highest sequence"
    );

    journal
        .delete_messages_to(&pid, 3, false)
        .await
        .expect("repeated soft delete should succeed");
}

pub async fn test_permanent_delete<J: Journal>(journal: &J) {
    let pid = unique_pid("hard");
    journal
        .write_messages(make_events(&pid, 1..=5))
        .await
        .expect("write should succeed");

    journal
        .delete_messages_to(&pid, 2, true)
        .await
        .expect("permanent delete should succeed");
    assert_eq!(sequences(&replay(journal, &pid, 0, u64::MAX, u64::MAX).await), vec![3, 4, 5]);

    journal
        .delete_messages_to(&pid, u64::MAX, true)
        .await
        .expect("delete to latest should succeed");
    assert!(replay(journal, &pid, 0, u64::MAX, u64::MAX).await.is_empty());
}

pub async fn test_delete_on_empty_stream<J: Journal>(journal: &J) {
    let pid = unique_pid("delete-empty");
    journal
        .delete_messages_to(&pid, 10, true)
        .await
        .expect("permanent delete of nothing should succeed");
    journal
        .delete_messages_to(&pid, 10, false)
        .await
        .expect("soft delete of nothing should succeed");
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all Journal interface tests against a journal implementation.
#[macro_export]
macro_rules! run_journal_tests {
    ($journal:expr) => {
        use $crate::storage::journal_tests::*;

        test_highest_of_empty_stream($journal).await;
        println!("  test_highest_of_empty_stream: PASSED");

        test_highest_after_writes($journal).await;
        println!("  test_highest_after_writes: PASSED");

        test_replay_in_sequence_order($journal).await;
        println!("  test_replay_in_sequence_order: PASSED");

        test_replay_window($journal).await;
        println!("  test_replay_window: PASSED");

        test_replay_max($journal).await;
        println!("  test_replay_max: PASSED");

        test_replay_empty_requests($journal).await;
        println!("  test_replay_empty_requests: PASSED");

        test_multi_stream_write($journal).await;
        println!("  test_multi_stream_write: PASSED");

        test_duplicate_sequence_rejected($journal).await;
        println!("  test_duplicate_sequence_rejected: PASSED");

        test_rewrite_conflicts_and_is_atomic($journal).await;
        println!("  test_rewrite_conflicts_and_is_atomic: PASSED");

        test_soft_delete($journal).await;
        println!("  test_soft_delete: PASSED");

        test_permanent_delete($journal).await;
        println!("  test_permanent_delete: PASSED");

        test_delete_on_empty_stream($journal).await;
        println!("  test_delete_on_empty_stream: PASSED");
    };
}
