//! Snapshot storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::serialization::Payload;
use crate::storage::Result;

/// Identity of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMetadata {
    pub persistence_id: String,
    pub sequence_nr: u64,
    pub timestamp: DateTime<Utc>,
}

impl SnapshotMetadata {
    pub fn new(persistence_id: impl Into<String>, sequence_nr: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            persistence_id: persistence_id.into(),
            sequence_nr,
            timestamp,
        }
    }
}

/// A loaded snapshot.
#[derive(Debug, Clone)]
pub struct SelectedSnapshot {
    pub metadata: SnapshotMetadata,
    pub snapshot: Payload,
}

/// Upper bounds a snapshot must satisfy to be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSelectionCriteria {
    pub max_sequence_nr: u64,
    pub max_timestamp: DateTime<Utc>,
}

impl SnapshotSelectionCriteria {
    pub fn new(max_sequence_nr: u64, max_timestamp: DateTime<Utc>) -> Self {
        Self {
            max_sequence_nr,
            max_timestamp,
        }
    }

    /// Matches every snapshot.
    pub fn latest() -> Self {
        Self {
            max_sequence_nr: u64::MAX,
            max_timestamp: DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn matches(&self, sequence_nr: u64, timestamp: DateTime<Utc>) -> bool {
        sequence_nr <= self.max_sequence_nr && timestamp <= self.max_timestamp
    }
}

/// Interface for snapshot persistence.
///
/// Snapshots are an optimization: when recovering a stream the host loads
/// the youngest acceptable snapshot and replays only the events after it.
///
/// Implementations:
/// - `TableSnapshotStore`: one table row per snapshot
/// - `ObjectSnapshotStore`: one object per snapshot
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Youngest snapshot satisfying `criteria`, or `None`.
    async fn load(
        &self,
        persistence_id: &str,
        criteria: &SnapshotSelectionCriteria,
    ) -> Result<Option<SelectedSnapshot>>;

    /// Store a snapshot.
    async fn save(&self, metadata: &SnapshotMetadata, snapshot: &Payload) -> Result<()>;

    /// Delete the snapshot identified by `metadata`. Absent snapshots are ignored.
    async fn delete(&self, metadata: &SnapshotMetadata) -> Result<()>;

    /// Delete every snapshot of the stream satisfying `criteria`.
    async fn delete_matching(
        &self,
        persistence_id: &str,
        criteria: &SnapshotSelectionCriteria,
    ) -> Result<()>;
}
