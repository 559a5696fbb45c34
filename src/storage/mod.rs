//! Storage engine: key encoding, sharding, backends, journal and snapshot stores.
//!
//! ```text
//! host ──> Journal / SnapshotStore
//!             │ resolve(persistence_id)        ┌─ shard 0 (TableBackend / ObjectBackend)
//!             ├──────────> Shards ─────────────┼─ shard 1
//!             │ encode_sequence(seq)           └─ ...
//!             └──────────> key_codec
//! ```

pub mod backend;
pub mod connection;
pub mod initializer;
pub mod journal;
pub mod key_codec;
pub mod mock;
pub mod shard;
pub mod snapshot;

#[cfg(feature = "dynamo")]
pub mod dynamo;

#[cfg(feature = "s3")]
pub mod s3;

pub use backend::{
    ObjectBackend, ObjectInfo, PropertyValue, RowRange, TableBackend, TableBatch, TableEntity,
    TableOperation, MAX_BATCH_OPERATIONS,
};
pub use connection::{connect_object_backend, connect_table_backend, ConnectionString};
pub use initializer::{
    ensure_journal_schema, ensure_snapshot_container_schema, ensure_snapshot_table_schema,
};
pub use journal::{JournalEntry, TableJournal};
pub use mock::{MemoryObjectBackend, MemoryTableBackend};
pub use shard::{LeadingHexRouter, ShardRouter, Shards};
pub use snapshot::{ObjectSnapshotStore, TableSnapshotStore};

use crate::serialization::SerializationError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Coarse classification of a [`StorageError`] for host retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend unavailable, throttled or timed out. Retrying may succeed.
    Transient,
    /// An insert hit an existing key.
    Conflict,
    /// A batch targeted a record that does not exist.
    NotFound,
    /// Retrying the same request can never succeed.
    Permanent,
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Sequence number {0} exceeds the encodable key range")]
    KeyOutOfRange(u64),

    #[error("Malformed key: {0:?}")]
    MalformedKey(String),

    #[error("Batch spans partitions: expected {expected}, got {actual}")]
    PartitionMismatch { expected: String, actual: String },

    #[error("Batch of {size} operations exceeds the backend limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Duplicate sequence number {sequence_nr} for {persistence_id} in one write")]
    DuplicateSequence {
        persistence_id: String,
        sequence_nr: u64,
    },

    #[error("Record already exists: partition={partition_key}, row={row_key}")]
    Conflict {
        partition_key: String,
        row_key: String,
    },

    #[error("Record not found: partition={partition_key}, row={row_key}")]
    NotFound {
        partition_key: String,
        row_key: String,
    },

    #[error("Resource not found: {0}")]
    MissingResource(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("No backends configured")]
    NoBackends,

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Backend {0} not enabled in this build")]
    BackendNotEnabled(String),
}

impl StorageError {
    /// Classify this error for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Unavailable(_) => ErrorKind::Transient,
            StorageError::Conflict { .. } => ErrorKind::Conflict,
            StorageError::NotFound { .. } | StorageError::MissingResource(_) => {
                ErrorKind::NotFound
            }
            _ => ErrorKind::Permanent,
        }
    }

    /// Whether retrying the failed call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
