//! Event journal interface.

use async_trait::async_trait;

use crate::serialization::Payload;
use crate::storage::Result;

/// One event of a stream as exchanged with the host.
#[derive(Debug, Clone)]
pub struct PersistentRepr {
    pub persistence_id: String,
    pub sequence_nr: u64,
    pub payload: Payload,
    /// Tombstone flag. Replay never yields deleted events.
    pub deleted: bool,
}

impl PersistentRepr {
    pub fn new(persistence_id: impl Into<String>, sequence_nr: u64, payload: Payload) -> Self {
        Self {
            persistence_id: persistence_id.into(),
            sequence_nr,
            payload,
            deleted: false,
        }
    }
}

/// Interface for event journal persistence.
///
/// Sequence numbers are assigned by the host and increase per stream. The
/// journal never reorders or renumbers events.
///
/// Implementations:
/// - `TableJournal`: sharded partitioned-table storage
#[async_trait]
pub trait Journal: Send + Sync {
    /// Persist a batch of events, possibly spanning several streams.
    ///
    /// Events of one stream are written atomically. Streams are written
    /// independently, so a failure can leave other streams of the same
    /// call persisted.
    async fn write_messages(&self, messages: Vec<PersistentRepr>) -> Result<()>;

    /// Highest stored sequence number at or above `from_sequence_nr`, or 0.
    async fn read_highest_sequence_nr(
        &self,
        persistence_id: &str,
        from_sequence_nr: u64,
    ) -> Result<u64>;

    /// Deliver non-deleted events in `[from, to]` in ascending order.
    ///
    /// Stops after `max` events. Returns the number of events delivered.
    async fn replay_messages(
        &self,
        persistence_id: &str,
        from_sequence_nr: u64,
        to_sequence_nr: u64,
        max: u64,
        callback: &mut (dyn FnMut(PersistentRepr) + Send),
    ) -> Result<u64>;

    /// Delete every event with sequence `<= to_sequence_nr`.
    ///
    /// Permanent deletion removes the rows. Otherwise rows are kept and
    /// marked deleted.
    async fn delete_messages_to(
        &self,
        persistence_id: &str,
        to_sequence_nr: u64,
        permanent: bool,
    ) -> Result<()>;
}
